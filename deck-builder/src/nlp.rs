use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use language_utils::{DocToken, Language, ParsedSentence, PartOfSpeech};
use tysm::chat_completions::ChatClient;

use crate::config::Config;
use crate::deck::Deck;
use crate::error::{DeckError, Result};
use crate::lemmatize::ParseCache;

/// A token as the model reports it
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct ParsedToken {
    pub text: String,
    /// Whitespace following the token in the sentence ("" or " ")
    pub whitespace: String,
    pub lemma: String,
    pub pos: PartOfSpeech,
    /// Dependency relation (e.g. nsubj, obj, svp, compound:prt)
    pub dep: String,
    /// 1-based index of the head token, 0 for the root
    pub head: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct DependencyParseResponse {
    #[serde(rename = "1. thoughts")]
    pub thoughts: String,
    #[serde(rename = "2. tokens")]
    pub tokens: Vec<ParsedToken>,
}

/// Turn the model's 1-based heads into the 0-based form the cache stores,
/// where the root points at itself.
pub fn into_parsed_sentence(
    sentence: &str,
    response: DependencyParseResponse,
) -> Result<ParsedSentence> {
    let malformed = |reason: String| DeckError::MalformedParse {
        sentence: sentence.to_string(),
        reason,
    };
    if response.tokens.is_empty() {
        return Err(malformed("no tokens".to_string()));
    }

    let len = response.tokens.len();
    let doc = response
        .tokens
        .into_iter()
        .enumerate()
        .map(|(i, token)| {
            let head = match token.head {
                0 => i,
                head if head <= len => head - 1,
                head => {
                    return Err(malformed(format!(
                        "token {} `{}` has head {head} but there are {len} tokens",
                        i + 1,
                        token.text
                    )));
                }
            };
            Ok(DocToken {
                text: token.text,
                whitespace: token.whitespace,
                pos: token.pos,
                lemma: token.lemma,
                dep: token.dep,
                head,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedSentence {
        sentence: sentence.to_string(),
        doc,
    })
}

/// Sentences the next partition pass will need a parse for: rows with a
/// sentence inside its length band and no lemmatization yet.
pub fn sentences_to_parse(deck: &Deck, config: &Config) -> Vec<String> {
    deck.iter()
        .filter(|row| row.lemmatized_sentence.is_none())
        .filter_map(|row| {
            let sentence = row.sentence_source.as_ref()?;
            config
                .sentence_length
                .band_for(&row.index)
                .contains(sentence)
                .then(|| sentence.clone())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn parse_with_llm(
    language: Language,
    sentence: &str,
    chat_client: &ChatClient,
) -> anyhow::Result<ParsedSentence> {
    let system_prompt = format!(
        r#"You are an expert in {language} syntax and dependency grammar. Split the {language} sentence into tokens (words and punctuation, in order) and analyze each one.

For each token give:
1. text: the token exactly as written
2. whitespace: the whitespace that follows it in the sentence ("" or " ")
3. lemma: its dictionary form (nouns capitalized as in a dictionary)
4. pos: its Universal Dependencies part of speech
5. dep: its dependency relation. Mark separable verb prefixes (as in "steht ... auf") with "svp".
6. head: the 1-based index of the token it depends on, or 0 for the root

Exactly one token is the root. All other heads point at another token, forming a tree."#
    );
    let user_prompt = format!("Sentence: \"{sentence}\"");

    let response: DependencyParseResponse = chat_client
        .chat_with_system_prompt(system_prompt, user_prompt)
        .await?;

    Ok(into_parsed_sentence(sentence, response)?)
}

/// Parse every sentence not yet in the cache file and append the results.
///
/// Sentences the model fails on are logged and left out; the next
/// partition pass reports them as missing.
pub async fn parse_missing(
    sentences: Vec<String>,
    cache_path: &Path,
    language: Language,
    chat_client: &ChatClient,
    concurrency: usize,
) -> anyhow::Result<usize> {
    let cache = ParseCache::load(cache_path)?;
    let to_parse = sentences
        .into_iter()
        .filter(|sentence| !cache.contains(sentence))
        .collect::<BTreeSet<_>>();

    log::info!(
        "{} sentences already parsed, {} to parse",
        cache.len(),
        to_parse.len()
    );
    if to_parse.is_empty() {
        return Ok(0);
    }

    if let Some(parent) = cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let output_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(cache_path)
        .with_context(|| format!("Failed to open parse cache {}", cache_path.display()))?;
    let mut writer = std::io::BufWriter::new(output_file);

    let pb = ProgressBar::new(to_parse.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sentences parsed ({per_sec}, ${msg}, {eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut results = futures::stream::iter(to_parse)
        .map(|sentence| {
            let pb = pb.clone();
            async move {
                let result = parse_with_llm(language, &sentence, chat_client)
                    .await
                    .inspect_err(|e| log::warn!("Failed to parse sentence '{sentence}': {e:#}"))
                    .ok();
                pb.set_message(format!("{:.2}", chat_client.cost().unwrap_or(0.0)));
                pb.inc(1);
                result
            }
        })
        .buffer_unordered(concurrency);

    let mut parsed = 0;
    while let Some(result) = results.next().await {
        if let Some(sentence) = result {
            writeln!(writer, "{}", serde_json::to_string(&sentence)?)?;
            parsed += 1;
        }
    }
    writer.flush()?;

    pb.finish_with_message(format!("{:.2}", chat_client.cost().unwrap_or(0.0)));
    log::info!("Appended {parsed} parses to {}", cache_path.display());
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexGranularity;

    fn token(text: &str, lemma: &str, pos: PartOfSpeech, dep: &str, head: usize) -> ParsedToken {
        ParsedToken {
            text: text.to_string(),
            whitespace: " ".to_string(),
            lemma: lemma.to_string(),
            pos,
            dep: dep.to_string(),
            head,
        }
    }

    #[test]
    fn test_heads_become_zero_based() {
        let response = DependencyParseResponse {
            thoughts: String::new(),
            tokens: vec![
                token("Er", "er", PartOfSpeech::Pron, "nsubj", 2),
                token("steht", "stehen", PartOfSpeech::Verb, "root", 0),
                token("auf", "auf", PartOfSpeech::Adp, "svp", 2),
            ],
        };
        let parsed = into_parsed_sentence("Er steht auf", response).unwrap();
        let heads = parsed.doc.iter().map(|t| t.head).collect::<Vec<_>>();
        assert_eq!(heads, vec![1, 1, 1]);
        assert_eq!(
            crate::lemmatize::tokenize(&parsed).unwrap(),
            vec!["er", "aufstehen"]
        );
    }

    #[test]
    fn test_head_past_the_end_is_malformed() {
        let response = DependencyParseResponse {
            thoughts: String::new(),
            tokens: vec![token("Ja", "ja", PartOfSpeech::Intj, "root", 2)],
        };
        assert!(matches!(
            into_parsed_sentence("Ja", response),
            Err(DeckError::MalformedParse { .. })
        ));
        let empty = DependencyParseResponse {
            thoughts: String::new(),
            tokens: vec![],
        };
        assert!(into_parsed_sentence("Ja", empty).is_err());
    }

    #[test]
    fn test_sentences_to_parse() {
        let mut config = Config::default();
        config.sentence_length.min = 5;
        config.sentence_length.max = 30;
        let deck = Deck::read_from(
            "1|a|||Der Hund bellt laut.\n\
             2|b|||kurz\n\
             3|c|||Die Katze schläft.||die;Katze;schlafen;.\n\
             4|d\n\
             5|e|||Der Hund bellt laut.\n"
                .as_bytes(),
            IndexGranularity::default(),
        )
        .unwrap();
        assert_eq!(
            sentences_to_parse(&deck, &config),
            vec!["Der Hund bellt laut.".to_string()]
        );
    }
}
