use std::io;
use std::path::Path;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::checkpoint::write_atomically;
use crate::deck::Deck;
use crate::error::Result;

/// How many deck rows with a lemmatized sentence contain each lemma.
///
/// A lemma appearing twice in one sentence counts once for that row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordCountLedger {
    counts: FxHashMap<String, u32>,
}

impl WordCountLedger {
    pub fn from_deck(deck: &Deck, separator: char) -> Self {
        let mut ledger = Self::default();
        for row in deck.iter() {
            if let Some(lemmas) = row.lemmas(separator) {
                for lemma in lemmas.unique() {
                    *ledger.counts.entry(lemma.to_string()).or_default() += 1;
                }
            }
        }
        ledger
    }

    /// Zero for lemmas the deck has never seen
    pub fn count(&self, lemma: &str) -> u32 {
        self.counts.get(lemma).copied().unwrap_or(0)
    }

    /// Take one row's worth of `lemma` out of the ledger, stopping at zero.
    pub fn decrement(&mut self, lemma: &str) {
        if let Some(count) = self.counts.get_mut(lemma) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries with a non-zero count, most frequent first, ties by lemma
    pub fn sorted(&self) -> Vec<(&str, u32)> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(lemma, count)| (lemma.as_str(), *count))
            .sorted_by(|(a_lemma, a_count), (b_lemma, b_count)| {
                b_count.cmp(a_count).then_with(|| a_lemma.cmp(b_lemma))
            })
            .collect()
    }

    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);
        for (lemma, count) in self.sorted() {
            writer.write_record([lemma, count.to_string().as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomically(path, |writer| self.write_to(writer))
    }
}
