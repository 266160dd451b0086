use std::path::Path;

use deck_builder::baseform::BaseformOverrides;
use deck_builder::checkpoint::{DiskCheckpoint, NoCheckpoint};
use deck_builder::ledger::WordCountLedger;
use deck_builder::lemmatize::DependencyParser;
use deck_builder::partition::Partitioner;
use deck_builder::{Config, Deck, IndexGranularity, Result};
use language_utils::{DocToken, ParsedSentence, PartOfSpeech};

/// Treats every whitespace-separated word as its own lemma
struct WordParser;

impl DependencyParser for WordParser {
    fn parse(&self, sentence: &str) -> Result<ParsedSentence> {
        Ok(ParsedSentence {
            sentence: sentence.to_string(),
            doc: sentence
                .split_whitespace()
                .map(|word| DocToken {
                    text: word.to_string(),
                    whitespace: " ".to_string(),
                    pos: PartOfSpeech::X,
                    lemma: word.to_string(),
                    dep: "ROOT".to_string(),
                    head: 0,
                })
                .collect(),
        })
    }
}

const DECK: &str = "\
1|Hund|||der Hund sein
2|Katze|||der Katze sein
3|Maus|||der Maus sein
4|Fuchs|||der Fuchs sein Wald schleichen
5|Eule|||der Eule sein Nacht jagen
";

const CONFIG: &str = r#"
[rare_words]
min_rare_words_in_sentence = 2
max_occurrences_in_deck = 2

[sentence_length]
min = 1
max = 200
"#;

fn write_workspace(dir: &Path) -> Config {
    std::fs::write(dir.join("deck.toml"), CONFIG).unwrap();
    std::fs::write(dir.join("deck.csv"), DECK).unwrap();
    std::fs::write(dir.join("words-bad-baseform.csv"), "").unwrap();
    Config::load(&dir.join("deck.toml")).unwrap()
}

fn words(deck: &Deck) -> Vec<&str> {
    deck.iter().map(|row| row.word.as_str()).collect()
}

#[test]
fn test_partition_demotes_sentences_without_rare_words() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_workspace(dir.path());
    let deck = Deck::load(&config.paths.deck, config.index).unwrap();
    let overrides =
        BaseformOverrides::load(&config.paths.baseform_overrides, config.index).unwrap();
    let checkpoint = DiskCheckpoint::new(&config.paths, config.index);

    let outcome = Partitioner::new(&config, &WordParser, &checkpoint)
        .run(deck, &overrides)
        .unwrap();

    assert_eq!(outcome.kept, 2);
    assert_eq!(outcome.demoted, 3);
    assert_eq!(outcome.out_of_band, 0);
    assert_eq!(outcome.pending, 3);
    assert_eq!(
        words(&outcome.deck),
        vec!["Fuchs", "Eule", "Hund", "Katze", "Maus"]
    );
    assert!(outcome.deck.rows()[..2].iter().all(|row| row.has_sentence()));
    assert!(outcome.deck.rows()[2..].iter().all(|row| !row.has_sentence()
        && row.lemmatized_sentence.is_none()
        && row.sentence_target.is_none()));

    // the sweep leaves exactly the counts of the rows it kept
    let kept = Deck::new(
        outcome.deck.rows()[..2].to_vec(),
        IndexGranularity::default(),
    )
    .unwrap();
    let expected = WordCountLedger::from_deck(&kept, config.lemma_separator);
    assert_eq!(outcome.ledger.sorted(), expected.sorted());

    // checkpoints landed on disk
    let saved = Deck::load(&config.paths.deck, config.index).unwrap();
    assert_eq!(saved, outcome.deck);
    let counts = std::fs::read_to_string(&config.paths.word_counts).unwrap();
    assert_eq!(counts.lines().take(2).collect::<Vec<_>>(), vec!["der|2", "sein|2"]);
    assert_eq!(counts.lines().count(), 8);
}

#[test]
fn test_partition_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_workspace(dir.path());
    let deck = Deck::load(&config.paths.deck, config.index).unwrap();
    let partitioner = Partitioner::new(&config, &WordParser, &NoCheckpoint);

    let first = partitioner
        .run(deck, &BaseformOverrides::default())
        .unwrap();
    let second = partitioner
        .run(first.deck.clone(), &first.overrides)
        .unwrap();

    assert_eq!(second.demoted, 0);
    assert_eq!(second.kept, first.kept);
    assert_eq!(second.deck, first.deck);
    assert_eq!(second.ledger.sorted(), first.ledger.sorted());
}

#[test]
fn test_partition_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_workspace(dir.path());
    let partitioner = Partitioner::new(&config, &WordParser, &NoCheckpoint);

    let run = || {
        let deck = Deck::load(&config.paths.deck, config.index).unwrap();
        partitioner
            .run(deck, &BaseformOverrides::default())
            .unwrap()
    };
    let (a, b) = (run(), run());
    assert_eq!(a.deck, b.deck);
    assert_eq!(a.ledger.sorted(), b.ledger.sorted());
}
