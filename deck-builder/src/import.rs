//! Adding new words from a frequency-ordered word list.

use std::io;
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::baseform::is_noun;
use crate::deck::{Deck, DeckRow};
use crate::error::{DeckError, Result};
use crate::index::CompositeIndex;

/// A line of a word list: `word|[part of speech]|[translation]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordListEntry {
    pub word: String,
    pub part_of_speech: Option<String>,
    pub translation: Option<String>,
}

fn reader_for<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

fn non_empty(record: &csv::StringRecord, i: usize) -> Option<String> {
    record
        .get(i)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn read_word_list<R: io::Read>(reader: R) -> Result<Vec<WordListEntry>> {
    let mut entries = Vec::new();
    for record in reader_for(reader).records() {
        let record = record?;
        let Some(word) = non_empty(&record, 0) else {
            continue;
        };
        entries.push(WordListEntry {
            word,
            part_of_speech: non_empty(&record, 1),
            translation: non_empty(&record, 2),
        });
    }
    Ok(entries)
}

/// Words the learner already knows, one per line; extra columns are ignored
pub fn read_known_words<R: io::Read>(reader: R) -> Result<FxHashSet<String>> {
    let mut known = FxHashSet::default();
    for record in reader_for(reader).records() {
        if let Some(word) = non_empty(&record?, 0) {
            known.insert(word);
        }
    }
    Ok(known)
}

pub fn load_word_list(path: &Path) -> Result<Vec<WordListEntry>> {
    if !path.exists() {
        return Err(DeckError::MissingInput(path.to_path_buf()));
    }
    read_word_list(io::BufReader::new(std::fs::File::open(path)?))
}

pub fn load_known_words(path: &Path) -> Result<FxHashSet<String>> {
    if !path.exists() {
        return Err(DeckError::MissingInput(path.to_path_buf()));
    }
    read_known_words(io::BufReader::new(std::fs::File::open(path)?))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub headwords: usize,
    pub senses: usize,
    pub skipped: usize,
}

/// Append the entries that are new to the deck.
///
/// New words get primary indices after the deck's highest one, in list
/// order. An entry repeating the word right before it becomes another sense
/// of that word (`12`, `12.001`, `12.002`, ...). Words already in the deck or
/// in `known` are skipped. Entries without a part of speech whose
/// dictionary form is capitalized are marked as nouns.
pub fn import(
    deck: Deck,
    entries: Vec<WordListEntry>,
    known: &FxHashSet<String>,
) -> Result<(Deck, ImportStats)> {
    let granularity = deck.granularity();
    let mut next_primary = deck.max_primary().map_or(1, |max| max + 1);
    let mut existing = deck
        .iter()
        .map(|row| row.word.clone())
        .collect::<FxHashSet<_>>();
    let mut rows = deck.into_rows();
    let mut stats = ImportStats::default();
    let mut previous: Option<(String, CompositeIndex)> = None;

    for entry in entries {
        let index = if let Some((word, index)) = &mut previous
            && *word == entry.word
        {
            *index = index.next_sense(granularity)?;
            stats.senses += 1;
            *index
        } else if existing.contains(&entry.word) || known.contains(&entry.word) {
            log::debug!("Skipping `{}`, already in the deck or known", entry.word);
            stats.skipped += 1;
            previous = None;
            continue;
        } else {
            let index = CompositeIndex::headword(next_primary);
            next_primary += 1;
            existing.insert(entry.word.clone());
            previous = Some((entry.word.clone(), index));
            stats.headwords += 1;
            index
        };

        let part_of_speech = entry
            .part_of_speech
            .or_else(|| is_noun(&entry.word).then(|| "noun".to_string()));
        rows.push(DeckRow {
            part_of_speech,
            translation: entry.translation,
            ..DeckRow::new(index, entry.word)
        });
    }

    rows.sort_by_key(|row| (!row.has_sentence(), row.index));
    log::info!(
        "Imported {} new words and {} extra senses, skipped {}",
        stats.headwords,
        stats.senses,
        stats.skipped
    );
    Ok((Deck::new(rows, granularity)?, stats))
}
