//! One pass over the deck deciding which generated sentences stay.
//!
//! Rows are visited from the highest index down so that, when two sentences
//! compete for the same rare words, the one belonging to the more frequent
//! (lower-index) word survives and the early part of the deck stays put.

use indicatif::{ProgressBar, ProgressStyle};

use crate::acceptance::{Evaluator, Verdict};
use crate::baseform::{BaseformOverrides, BaseformResolver};
use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::deck::{Deck, DeckRow};
use crate::error::Result;
use crate::ledger::WordCountLedger;
use crate::lemmatize::{DependencyParser, lemmatize};

#[derive(Debug, Clone)]
pub struct PartitionOutcome {
    /// Accepted rows first, then rows waiting for a sentence, each in index order
    pub deck: Deck,
    /// Counts over the accepted rows only
    pub ledger: WordCountLedger,
    pub overrides: BaseformOverrides,
    /// Rows whose sentence was accepted
    pub kept: usize,
    /// Rows whose sentence was rejected by the sweep
    pub demoted: usize,
    /// Rows whose sentence fell outside the length band
    pub out_of_band: usize,
    /// Rows without a sentence after the pass, demoted ones included
    pub pending: usize,
}

pub struct Partitioner<'a> {
    config: &'a Config,
    parser: &'a dyn DependencyParser,
    checkpoint: &'a dyn Checkpoint,
}

impl<'a> Partitioner<'a> {
    pub fn new(
        config: &'a Config,
        parser: &'a dyn DependencyParser,
        checkpoint: &'a dyn Checkpoint,
    ) -> Self {
        Self {
            config,
            parser,
            checkpoint,
        }
    }

    pub fn run(&self, deck: Deck, overrides: &BaseformOverrides) -> Result<PartitionOutcome> {
        let (deck, out_of_band) = self.filter_by_length(deck)?;
        self.checkpoint.deck(&deck)?;

        let deck = self.backfill_lemmas(deck)?;
        self.checkpoint.deck(&deck)?;

        let mut ledger = WordCountLedger::from_deck(&deck, self.config.lemma_separator);
        self.checkpoint.ledger(&ledger)?;

        let overrides = overrides.rekey(&deck);
        self.checkpoint.overrides(&overrides)?;

        let granularity = deck.granularity();
        let (with_sentence, mut pending) = deck.split_by_sentence();
        let verdicts = self.sweep(&with_sentence, &overrides, &mut ledger)?;

        let mut accepted = Vec::new();
        let mut demoted = 0;
        for (row, verdict) in with_sentence.into_iter().zip(verdicts) {
            match verdict {
                Verdict::Accepted => accepted.push(row),
                Verdict::Rejected { reason } => {
                    log::debug!(
                        "Demoting {} ({}): {reason}",
                        row.index.render(granularity),
                        row.word
                    );
                    demoted += 1;
                    pending.push(row.strip_to_identity());
                }
            }
        }
        pending.sort_by_key(|row| row.index);

        let kept = accepted.len();
        let deck = Deck::dedup_keep_first(
            accepted.into_iter().chain(pending).collect(),
            granularity,
        );
        let pending = deck.len() - kept;

        self.checkpoint.deck(&deck)?;
        self.checkpoint.ledger(&ledger)?;

        log::info!(
            "Partitioned deck: {kept} kept, {demoted} demoted, {out_of_band} outside the length band, {pending} waiting for a sentence"
        );

        Ok(PartitionOutcome {
            deck,
            ledger,
            overrides,
            kept,
            demoted,
            out_of_band,
            pending,
        })
    }

    /// Strip sentences whose length is outside the row's band. Returns the
    /// deck with sentence rows first and how many rows were stripped.
    fn filter_by_length(&self, mut deck: Deck) -> Result<(Deck, usize)> {
        let granularity = deck.granularity();
        deck.sort_by_index();
        let (with_sentence, mut pending) = deck.split_by_sentence();

        let mut in_band = Vec::with_capacity(with_sentence.len());
        let mut out_of_band = 0;
        for row in with_sentence {
            let band = self.config.sentence_length.band_for(&row.index);
            let sentence = row.sentence_source.as_deref().unwrap_or_default();
            if band.contains(sentence) {
                in_band.push(row);
            } else {
                log::debug!(
                    "Sentence for {} is {} characters, outside {}..={}",
                    row.index.render(granularity),
                    sentence.chars().count(),
                    band.min,
                    band.max
                );
                out_of_band += 1;
                pending.push(row.strip_to_identity());
            }
        }
        pending.sort_by_key(|row| row.index);

        Ok((Deck::concat(in_band, pending, granularity)?, out_of_band))
    }

    fn backfill_lemmas(&self, deck: Deck) -> Result<Deck> {
        let granularity = deck.granularity();
        let missing = deck
            .iter()
            .filter(|row| row.has_sentence() && row.lemmatized_sentence.is_none())
            .count();
        if missing == 0 {
            return Ok(deck);
        }

        let pb = ProgressBar::new(missing as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sentences lemmatized ({per_sec}, {eta})")
                .unwrap()
                .progress_chars("#>-"),
        );

        let rows = deck
            .into_rows()
            .into_iter()
            .map(|mut row| -> Result<DeckRow> {
                if row.lemmatized_sentence.is_none()
                    && let Some(sentence) = &row.sentence_source
                {
                    let lemmatized = lemmatize(self.parser, sentence, self.config.lemma_separator)?;
                    row.lemmatized_sentence = Some(lemmatized);
                    pb.inc(1);
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        pb.finish_and_clear();
        Deck::new(rows, granularity)
    }

    /// Evaluate rows from the last to the first, threading the ledger
    /// through, and return the verdicts in the rows' own order.
    fn sweep(
        &self,
        rows: &[DeckRow],
        overrides: &BaseformOverrides,
        ledger: &mut WordCountLedger,
    ) -> Result<Vec<Verdict>> {
        let evaluator = Evaluator::new(
            BaseformResolver::new(overrides),
            self.config.rare_words,
            self.config.lemma_separator,
            self.config.index,
        );
        let mut verdicts = rows
            .iter()
            .rev()
            .map(|row| evaluator.evaluate(row, ledger))
            .collect::<Result<Vec<_>>>()?;
        verdicts.reverse();
        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::NoCheckpoint;
    use crate::index::IndexGranularity;
    use language_utils::{DocToken, ParsedSentence, PartOfSpeech};
    use std::cell::RefCell;

    /// Every whitespace-separated word is its own lemma
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

    #[derive(Default)]
    struct RecordingCheckpoint {
        decks: RefCell<Vec<Deck>>,
    }

    impl Checkpoint for RecordingCheckpoint {
        fn deck(&self, deck: &Deck) -> Result<()> {
            self.decks.borrow_mut().push(deck.clone());
            Ok(())
        }

        fn ledger(&self, _ledger: &WordCountLedger) -> Result<()> {
            Ok(())
        }

        fn overrides(&self, _overrides: &BaseformOverrides) -> Result<()> {
            Ok(())
        }
    }

    fn config(min: usize, max: usize) -> Config {
        let mut config = Config::default();
        config.sentence_length.min = min;
        config.sentence_length.max = max;
        config.rare_words.max_occurrences_in_deck = 2;
        config
    }

    fn deck(text: &str) -> Deck {
        Deck::read_from(text.as_bytes(), IndexGranularity::default()).unwrap()
    }

    fn words(deck: &Deck) -> Vec<&str> {
        deck.iter().map(|row| row.word.as_str()).collect()
    }

    #[test]
    fn test_length_filter_strips_and_reorders() {
        let config = config(10, 20);
        let checkpoint = RecordingCheckpoint::default();
        let partitioner = Partitioner::new(&config, &WordParser, &checkpoint);

        let input = deck(
            "3|drei|num|three|zu kurz|too short\n\
             1|eins\n\
             2|zwei|num|two|zwei Wald Nacht Mond\n",
        );
        let (filtered, out_of_band) = partitioner.filter_by_length(input).unwrap();
        assert_eq!(out_of_band, 1);
        assert_eq!(words(&filtered), vec!["zwei", "eins", "drei"]);
        let stripped = filtered.get(&crate::index::CompositeIndex::headword(3)).unwrap();
        assert!(!stripped.has_sentence());
        assert!(stripped.sentence_target.is_none());
        assert_eq!(stripped.translation.as_deref(), Some("three"));
    }

    #[test]
    fn test_lower_index_wins_competition_for_rare_words() {
        let mut config = config(1, 200);
        config.rare_words.max_occurrences_in_deck = 1;
        let partitioner = Partitioner::new(&config, &WordParser, &NoCheckpoint);

        // both sentences use Wald and Nacht; only one of them can count them as rare
        let input = deck(
            "1|Fuchs|||Fuchs Wald Nacht\n\
             2|Eule|||Eule Wald Nacht\n",
        );
        let outcome = partitioner.run(input, &BaseformOverrides::default()).unwrap();
        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.demoted, 1);
        assert_eq!(words(&outcome.deck), vec!["Fuchs", "Eule"]);
        assert!(outcome.deck.rows()[0].has_sentence());
        assert!(!outcome.deck.rows()[1].has_sentence());
    }

    #[test]
    fn test_backfill_keeps_existing_lemmatization() {
        let config = config(1, 200);
        let partitioner = Partitioner::new(&config, &WordParser, &NoCheckpoint);
        let input = deck(
            "1|Fuchs|||Fuchs Wald Nacht||Fuchs;Baum;Stern\n\
             2|Eule|||Eule Mond Tag\n",
        );
        let deck = partitioner.backfill_lemmas(input).unwrap();
        assert_eq!(
            deck.rows()[0].lemmatized_sentence.as_deref(),
            Some("Fuchs;Baum;Stern")
        );
        assert_eq!(
            deck.rows()[1].lemmatized_sentence.as_deref(),
            Some("Eule;Mond;Tag")
        );
    }

    #[test]
    fn test_checkpoints_after_each_step() {
        let config = config(1, 200);
        let checkpoint = RecordingCheckpoint::default();
        let partitioner = Partitioner::new(&config, &WordParser, &checkpoint);
        let input = deck("2|Eule|||Eule Mond Tag\n1|Fuchs\n");
        let outcome = partitioner.run(input, &BaseformOverrides::default()).unwrap();

        let decks = checkpoint.decks.borrow();
        assert_eq!(decks.len(), 3);
        assert!(decks[0].rows()[0].lemmatized_sentence.is_none());
        assert!(decks[1].rows()[0].lemmatized_sentence.is_some());
        assert_eq!(decks[2], outcome.deck);
    }

    #[test]
    fn test_missing_parse_fails_the_pass() {
        let config = config(1, 200);
        let cache = crate::lemmatize::ParseCache::default();
        let partitioner = Partitioner::new(&config, &cache, &NoCheckpoint);
        let input = deck("1|Eule|||Eule Mond Tag\n");
        assert!(matches!(
            partitioner.run(input, &BaseformOverrides::default()),
            Err(crate::error::DeckError::MissingParse(_))
        ));
    }
}
