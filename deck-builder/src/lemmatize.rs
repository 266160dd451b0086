use std::io::{BufRead, BufReader};
use std::path::Path;

use language_utils::{ParsedSentence, PartOfSpeech};
use rustc_hash::FxHashMap;

use crate::error::{DeckError, Result};

/// Something that can produce a dependency parse for a sentence
pub trait DependencyParser {
    fn parse(&self, sentence: &str) -> Result<ParsedSentence>;
}

/// Dependency labels that mark a separable verb prefix ("steht ... auf")
const SEPARABLE_PREFIX_LABELS: [&str; 2] = ["svp", "compound:prt"];

/// Tokens the parser emits on its own that never carry a word
const ARTIFACTS: [&str; 4] = ["-", "--", "„", "“"];

fn is_artifact(lemma: &str) -> bool {
    lemma.trim().is_empty() || ARTIFACTS.contains(&lemma)
}

/// Lemmas of a parsed sentence in sentence order.
///
/// A separable prefix is glued onto the lemma of the verb it belongs to
/// ("auf" + "stehen" → "aufstehen") and left out on its own.
pub fn tokenize(parsed: &ParsedSentence) -> Result<Vec<String>> {
    let doc = &parsed.doc;
    let mut lemmas = doc
        .iter()
        .map(|token| Some(token.lemma.clone()))
        .collect::<Vec<_>>();

    for (i, token) in doc.iter().enumerate() {
        let head = parsed.head_of(i).ok_or_else(|| DeckError::MalformedParse {
            sentence: parsed.sentence.clone(),
            reason: format!(
                "token {i} `{}` points at head {} of {}",
                token.text,
                token.head,
                doc.len()
            ),
        })?;
        if token.head != i
            && SEPARABLE_PREFIX_LABELS.contains(&token.dep.as_str())
            && head.pos == PartOfSpeech::Verb
        {
            lemmas[token.head] = Some(format!("{}{}", token.text, head.lemma));
            lemmas[i] = None;
        }
    }

    Ok(lemmas
        .into_iter()
        .flatten()
        .filter(|lemma| !is_artifact(lemma))
        .collect())
}

/// The lemmatized form of a sentence as stored in the deck.
pub fn lemmatize<P: DependencyParser + ?Sized>(
    parser: &P,
    sentence: &str,
    separator: char,
) -> Result<String> {
    if sentence.trim().is_empty() {
        return Err(DeckError::EmptySentence);
    }
    let lemmas = tokenize(&parser.parse(sentence)?)?;
    if lemmas.is_empty() {
        return Err(DeckError::EmptySentence);
    }
    if let Some(token) = lemmas.iter().find(|lemma| lemma.contains(separator)) {
        return Err(DeckError::SeparatorCollision {
            token: token.clone(),
            separator,
        });
    }
    Ok(lemmas.join(&separator.to_string()))
}

/// Dependency parses keyed by sentence, backed by a JSONL file that
/// `deck-builder parse` appends to.
#[derive(Debug, Clone, Default)]
pub struct ParseCache {
    parses: FxHashMap<String, ParsedSentence>,
}

impl ParseCache {
    /// Read the cache file. A missing file is an empty cache; lines that do
    /// not deserialize are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cache = Self::default();
        if !path.exists() {
            log::info!("No parse cache at {}, starting empty", path.display());
            return Ok(cache);
        }

        let reader = BufReader::new(std::fs::File::open(path)?);
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ParsedSentence>(&line) {
                Ok(parsed) => cache.insert(parsed),
                Err(e) => log::warn!(
                    "Skipping unreadable parse on line {} of {}: {e}",
                    line_number + 1,
                    path.display()
                ),
            }
        }
        log::debug!("Loaded {} parses from {}", cache.len(), path.display());
        Ok(cache)
    }

    pub fn insert(&mut self, parsed: ParsedSentence) {
        self.parses.insert(parsed.sentence.clone(), parsed);
    }

    pub fn contains(&self, sentence: &str) -> bool {
        self.parses.contains_key(sentence)
    }

    pub fn len(&self) -> usize {
        self.parses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parses.is_empty()
    }
}

impl FromIterator<ParsedSentence> for ParseCache {
    fn from_iter<I: IntoIterator<Item = ParsedSentence>>(iter: I) -> Self {
        let mut cache = Self::default();
        for parsed in iter {
            cache.insert(parsed);
        }
        cache
    }
}

impl DependencyParser for ParseCache {
    fn parse(&self, sentence: &str) -> Result<ParsedSentence> {
        self.parses
            .get(sentence)
            .cloned()
            .ok_or_else(|| DeckError::MissingParse(sentence.to_string()))
    }
}
