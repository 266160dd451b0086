//! The deck: one `|`-delimited row per card.
//!
//! Columns, without a header:
//! `index|word|part_of_speech|translation|sentence_source|sentence_target|lemmatized_sentence`.
//! Trailing empty columns are left out when writing, so a freshly imported
//! word is just `index|word`.

use std::io;
use std::path::Path;

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::checkpoint::write_atomically;
use crate::error::{DeckError, Result};
use crate::index::{CompositeIndex, IndexGranularity};

const MAX_COLUMNS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckRow {
    pub index: CompositeIndex,
    pub word: String,
    pub part_of_speech: Option<String>,
    pub translation: Option<String>,
    pub sentence_source: Option<String>,
    pub sentence_target: Option<String>,
    /// Lemmas of `sentence_source` joined with the lemma separator.
    /// Computed once when missing and never recomputed.
    pub lemmatized_sentence: Option<String>,
}

impl DeckRow {
    pub fn new(index: CompositeIndex, word: impl Into<String>) -> Self {
        Self {
            index,
            word: word.into(),
            part_of_speech: None,
            translation: None,
            sentence_source: None,
            sentence_target: None,
            lemmatized_sentence: None,
        }
    }

    pub fn has_sentence(&self) -> bool {
        self.sentence_source.is_some()
    }

    /// Drop the generated sentence pair and its lemmatization, keeping what
    /// identifies the word.
    pub fn strip_to_identity(mut self) -> Self {
        self.sentence_source = None;
        self.sentence_target = None;
        self.lemmatized_sentence = None;
        self
    }

    pub fn lemmas(&self, separator: char) -> Option<impl Iterator<Item = &str>> {
        self.lemmatized_sentence
            .as_deref()
            .map(|lemmatized| lemmatized.split(separator))
    }

    fn to_record(&self, granularity: IndexGranularity) -> Vec<String> {
        let mut record = vec![
            self.index.render(granularity),
            self.word.clone(),
            self.part_of_speech.clone().unwrap_or_default(),
            self.translation.clone().unwrap_or_default(),
            self.sentence_source.clone().unwrap_or_default(),
            self.sentence_target.clone().unwrap_or_default(),
            self.lemmatized_sentence.clone().unwrap_or_default(),
        ];
        while record.last().is_some_and(|field| field.is_empty()) {
            record.pop();
        }
        record
    }

    fn from_record(
        record: &csv::StringRecord,
        line: usize,
        granularity: IndexGranularity,
    ) -> Result<Self> {
        if record.len() > MAX_COLUMNS {
            return Err(DeckError::MalformedRow {
                line,
                reason: format!("{} columns, at most {MAX_COLUMNS} allowed", record.len()),
            });
        }

        // values are kept byte for byte; blank ones are absent
        let field = |i: usize| {
            record
                .get(i)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string)
        };

        let index_text = field(0)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| DeckError::MalformedRow {
                line,
                reason: "missing index".to_string(),
            })?;
        let index = CompositeIndex::parse(&index_text, granularity)?;
        let word = field(1).ok_or_else(|| DeckError::MalformedRow {
            line,
            reason: format!("row {index_text} has no word"),
        })?;

        let row = Self {
            index,
            word,
            part_of_speech: field(2),
            translation: field(3),
            sentence_source: field(4),
            sentence_target: field(5),
            lemmatized_sentence: field(6),
        };

        if !row.has_sentence()
            && (row.sentence_target.is_some() || row.lemmatized_sentence.is_some())
        {
            return Err(DeckError::MissingField {
                index: index_text,
                word: row.word,
                field: "sentence_source",
            });
        }

        Ok(row)
    }
}

/// Deck rows in file order, with unique indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    rows: Vec<DeckRow>,
    granularity: IndexGranularity,
}

impl Deck {
    pub fn new(rows: Vec<DeckRow>, granularity: IndexGranularity) -> Result<Self> {
        let mut positions: FxHashMap<CompositeIndex, usize> = FxHashMap::default();
        for row in &rows {
            *positions.entry(row.index).or_default() += 1;
        }
        let duplicates = rows
            .iter()
            .filter(|row| positions[&row.index] > 1)
            .map(|row| format!("{}|{}", row.index.render(granularity), row.word))
            .collect::<Vec<_>>();
        if !duplicates.is_empty() {
            return Err(DeckError::DuplicateIndex { rows: duplicates });
        }
        Ok(Self { rows, granularity })
    }

    /// Build a deck from rows that may repeat an index, keeping the first
    /// occurrence of each.
    pub fn dedup_keep_first(rows: Vec<DeckRow>, granularity: IndexGranularity) -> Self {
        let rows = rows.into_iter().unique_by(|row| row.index).collect();
        Self { rows, granularity }
    }

    pub fn empty(granularity: IndexGranularity) -> Self {
        Self {
            rows: Vec::new(),
            granularity,
        }
    }

    pub fn granularity(&self) -> IndexGranularity {
        self.granularity
    }

    pub fn rows(&self) -> &[DeckRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DeckRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeckRow> {
        self.rows.iter()
    }

    pub fn get(&self, index: &CompositeIndex) -> Option<&DeckRow> {
        self.rows.iter().find(|row| &row.index == index)
    }

    pub fn render_index(&self, index: &CompositeIndex) -> String {
        index.render(self.granularity)
    }

    pub fn max_primary(&self) -> Option<u64> {
        self.rows.iter().map(|row| row.index.primary).max()
    }

    pub fn sort_by_index(&mut self) {
        self.rows.sort_by_key(|row| row.index);
    }

    /// Rows with a source sentence and rows still waiting for one, each in
    /// their current order.
    pub fn split_by_sentence(self) -> (Vec<DeckRow>, Vec<DeckRow>) {
        self.rows.into_iter().partition(DeckRow::has_sentence)
    }

    /// A deck made of `first` followed by `second`.
    pub fn concat(
        first: Vec<DeckRow>,
        second: Vec<DeckRow>,
        granularity: IndexGranularity,
    ) -> Result<Self> {
        Self::new(first.into_iter().chain(second).collect(), granularity)
    }

    pub fn read_from<R: io::Read>(reader: R, granularity: IndexGranularity) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            rows.push(DeckRow::from_record(&record, line, granularity)?);
        }
        Self::new(rows, granularity)
    }

    pub fn load(path: &Path, granularity: IndexGranularity) -> Result<Self> {
        if !path.exists() {
            return Err(DeckError::MissingInput(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::read_from(io::BufReader::new(file), granularity)
    }

    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .flexible(true)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);
        for row in &self.rows {
            writer.write_record(row.to_record(self.granularity))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomically(path, |writer| self.write_to(writer))
    }
}
