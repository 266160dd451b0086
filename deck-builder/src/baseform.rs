//! Dictionary forms of deck words.
//!
//! A deck word is written the way a learner reads it ("der Hund", "laufen.",
//! "Bank (Geld)"), while the lemmatizer emits bare lemmas ("Hund", "laufen",
//! "Bank"). [`baseform`] bridges the two for the common cases and the curated
//! [`BaseformOverrides`] table covers the rest.

use std::io;
use std::path::Path;

use crate::checkpoint::write_atomically;
use crate::deck::Deck;
use crate::error::{DeckError, Result};
use crate::index::{CompositeIndex, IndexGranularity};

const ARTICLES: [&str; 3] = ["der", "die", "das"];

/// Reduce a deck word to the form the lemmatizer produces for it.
pub fn baseform(word: &str) -> String {
    if ARTICLES.contains(&word) {
        return word.to_string();
    }

    let word = match word.find(['.', '(', ',']) {
        Some(end) => word[..end].trim(),
        None => word,
    };

    if word.chars().next().is_some_and(char::is_uppercase) {
        return word.to_string();
    }

    // "article + ... Noun" keeps the noun; without an uppercase letter the
    // phrase stays as written
    let has_article = ARTICLES
        .iter()
        .any(|article| word.strip_prefix(article).is_some_and(|rest| rest.starts_with(' ')));
    if has_article && let Some(start) = word.find(char::is_uppercase) {
        return word[start..].to_string();
    }

    word.to_string()
}

/// Nouns are the words whose dictionary form is capitalized.
pub fn is_noun(word: &str) -> bool {
    baseform(word).chars().next().is_some_and(char::is_uppercase)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseformOverride {
    /// Index of the deck row carrying `word` when the table was last re-keyed
    pub index: CompositeIndex,
    pub word: String,
    pub baseform: String,
}

/// Curated `index|word|baseform` table for words the generic rule gets wrong
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseformOverrides {
    entries: Vec<BaseformOverride>,
}

impl BaseformOverrides {
    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.word == word)
            .map(|entry| entry.baseform.as_str())
    }

    /// Point every entry at the deck row that currently carries its word,
    /// dropping entries whose word has left the deck.
    pub fn rekey(&self, deck: &Deck) -> Self {
        let mut entries = self
            .entries
            .iter()
            .filter_map(|entry| {
                let index = deck
                    .iter()
                    .filter(|row| row.word == entry.word)
                    .map(|row| row.index)
                    .min()?;
                Some(BaseformOverride {
                    index,
                    ..entry.clone()
                })
            })
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.index);
        Self { entries }
    }

    pub fn read_from<R: io::Read>(reader: R, granularity: IndexGranularity) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            let field = |i: usize, name: &str| {
                record
                    .get(i)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| DeckError::MalformedRow {
                        line,
                        reason: format!("baseform override has no {name}"),
                    })
            };
            entries.push(BaseformOverride {
                index: CompositeIndex::parse(&field(0, "index")?, granularity)?,
                word: field(1, "word")?,
                baseform: field(2, "baseform")?,
            });
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path, granularity: IndexGranularity) -> Result<Self> {
        if !path.exists() {
            return Err(DeckError::MissingInput(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::read_from(io::BufReader::new(file), granularity)
    }

    pub fn write_to<W: io::Write>(&self, writer: W, granularity: IndexGranularity) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);
        for entry in &self.entries {
            writer.write_record([
                entry.index.render(granularity).as_str(),
                entry.word.as_str(),
                entry.baseform.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path, granularity: IndexGranularity) -> Result<()> {
        write_atomically(path, |writer| self.write_to(writer, granularity))
    }
}

/// Override table first, generic rule second
#[derive(Debug, Clone, Copy)]
pub struct BaseformResolver<'a> {
    overrides: &'a BaseformOverrides,
}

impl<'a> BaseformResolver<'a> {
    pub fn new(overrides: &'a BaseformOverrides) -> Self {
        Self { overrides }
    }

    pub fn resolve(&self, word: &str) -> String {
        match self.overrides.lookup(word) {
            Some(baseform) => baseform.to_string(),
            None => baseform(word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::DeckRow;

    const G: IndexGranularity = IndexGranularity {
        sense_digits: 3,
        insertion_digits: 1,
    };

    #[test]
    fn test_baseform_rules() {
        assert_eq!(baseform("der Hund"), "Hund");
        assert_eq!(baseform("laufen."), "laufen");
        assert_eq!(baseform("die"), "die");
        assert_eq!(baseform("Schnell"), "Schnell");
        assert_eq!(baseform("das Haus, -¨er"), "Haus");
        assert_eq!(baseform("Bank (Geld)"), "Bank");
        assert_eq!(baseform("gehen (ging, gegangen)"), "gehen");
        assert_eq!(baseform("die gute Nachricht"), "Nachricht");
        assert_eq!(baseform("der kleine"), "der kleine");
        assert_eq!(baseform("die schnelle."), "die schnelle");
        assert_eq!(baseform("dieser"), "dieser");
        assert_eq!(baseform("schnell"), "schnell");
    }

    #[test]
    fn test_is_noun() {
        assert!(is_noun("der Hund"));
        assert!(is_noun("Bank (Geld)"));
        assert!(!is_noun("laufen"));
        assert!(!is_noun("das"));
    }

    fn overrides() -> BaseformOverrides {
        BaseformOverrides::read_from(
            "7|Angestellte|Angestellter\n3|am|an\n9|verschwunden|verschwinden\n".as_bytes(),
            G,
        )
        .unwrap()
    }

    #[test]
    fn test_resolver_prefers_override() {
        let overrides = overrides();
        let resolver = BaseformResolver::new(&overrides);
        assert_eq!(resolver.resolve("am"), "an");
        assert_eq!(resolver.resolve("der Hund"), "Hund");
    }

    #[test]
    fn test_rekey_follows_deck() {
        let deck = Deck::new(
            vec![
                DeckRow::new(CompositeIndex::headword(2), "am"),
                DeckRow::new(CompositeIndex::headword(12), "Angestellte"),
                DeckRow::new(CompositeIndex::headword(12).next_sense(G).unwrap(), "am"),
            ],
            G,
        )
        .unwrap();

        let rekeyed = overrides().rekey(&deck);
        let mut out = Vec::new();
        rekeyed.write_to(&mut out, G).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2|am|an\n12|Angestellte|Angestellter\n"
        );
    }

    #[test]
    fn test_incomplete_override_line() {
        let err = BaseformOverrides::read_from("1|Hund\n".as_bytes(), G).unwrap_err();
        assert!(matches!(err, DeckError::MalformedRow { line: 1, .. }));
    }
}
