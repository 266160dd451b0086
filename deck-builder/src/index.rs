//! Composite row keys.
//!
//! Every deck row is identified by a headword number plus an optional
//! variant. On disk the key keeps its historical decimal form: `12` is a
//! headword, `12.001` an alternate sense of it, `12.0001` a headword that was
//! inserted right after `12` without renumbering the rest of the deck.
//!
//! The decimal form is only ever parsed and rendered here; the rest of the
//! crate works with [`CompositeIndex`] and never touches floats.

use std::cmp::Ordering;

use crate::error::{DeckError, Result};

/// How many fractional digits each variant kind occupies in the decimal form
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IndexGranularity {
    /// Digits used for alternate senses (3 → steps of 0.001)
    pub sense_digits: u8,
    /// Digits used for inserted headwords, after the sense digits (1 → steps of 0.0001)
    pub insertion_digits: u8,
}

impl Default for IndexGranularity {
    fn default() -> Self {
        Self {
            sense_digits: 3,
            insertion_digits: 1,
        }
    }
}

impl IndexGranularity {
    pub fn total_digits(&self) -> usize {
        self.sense_digits as usize + self.insertion_digits as usize
    }

    fn max_sense(&self) -> u32 {
        10u32.pow(self.sense_digits as u32) - 1
    }

    fn max_insertion(&self) -> u32 {
        10u32.pow(self.insertion_digits as u32) - 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.sense_digits == 0 || self.insertion_digits == 0 {
            return Err(DeckError::Config(
                "index granularity digits must be at least 1".to_string(),
            ));
        }
        // both parts must fit in a u32
        if self.sense_digits > 9 || self.insertion_digits > 9 {
            return Err(DeckError::Config(
                "index granularity digits must be at most 9".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which sub-row of a headword a key points at.
///
/// Ordered by sense first, then insertion, which is the same order the
/// fixed-width decimal digits produce when compared one at a time from the
/// first decimal place.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variant {
    pub sense: u32,
    pub insertion: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompositeIndex {
    pub primary: u64,
    pub variant: Variant,
}

impl CompositeIndex {
    pub fn headword(primary: u64) -> Self {
        Self {
            primary,
            variant: Variant::default(),
        }
    }

    pub fn is_headword(&self) -> bool {
        self.variant == Variant::default()
    }

    /// Parse the legacy decimal form (`12`, `12.0`, `12.001`, `12.0001`).
    pub fn parse(text: &str, granularity: IndexGranularity) -> Result<Self> {
        let text = text.trim();
        let malformed = || DeckError::MalformedIndex(text.to_string());

        let (integer, fraction) = match text.split_once('.') {
            Some((integer, fraction)) if !fraction.is_empty() => (integer, fraction),
            Some(_) => return Err(malformed()),
            None => (text, ""),
        };

        if integer.is_empty()
            || !integer.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }

        let primary = integer.parse::<u64>().map_err(|_| malformed())?;

        let significant = fraction.trim_end_matches('0');
        let allowed = granularity.total_digits();
        if significant.len() > allowed {
            return Err(DeckError::IndexGranularity {
                text: text.to_string(),
                digits: significant.len(),
                allowed,
            });
        }

        let padded = format!("{significant:0<allowed$}");
        let (sense, insertion) = padded.split_at(granularity.sense_digits as usize);

        Ok(Self {
            primary,
            variant: Variant {
                sense: sense.parse().map_err(|_| malformed())?,
                insertion: insertion.parse().map_err(|_| malformed())?,
            },
        })
    }

    /// Render the legacy decimal form with trailing zeros removed.
    pub fn render(&self, granularity: IndexGranularity) -> String {
        if self.is_headword() {
            return self.primary.to_string();
        }
        let digits = format!(
            "{sense:0sw$}{insertion:0iw$}",
            sense = self.variant.sense,
            insertion = self.variant.insertion,
            sw = granularity.sense_digits as usize,
            iw = granularity.insertion_digits as usize,
        );
        format!("{}.{}", self.primary, digits.trim_end_matches('0'))
    }

    /// The key for another sense of the same headword
    pub fn next_sense(&self, granularity: IndexGranularity) -> Result<Self> {
        let sense = self.variant.sense + 1;
        if sense > granularity.max_sense() {
            return Err(DeckError::IndexGranularity {
                text: self.render(granularity),
                digits: granularity.sense_digits as usize + 1,
                allowed: granularity.sense_digits as usize,
            });
        }
        Ok(Self {
            primary: self.primary,
            variant: Variant { sense, insertion: 0 },
        })
    }

    /// The key for a headword inserted right after this one
    pub fn next_insertion(&self, granularity: IndexGranularity) -> Result<Self> {
        let insertion = self.variant.insertion + 1;
        if insertion > granularity.max_insertion() {
            return Err(DeckError::IndexGranularity {
                text: self.render(granularity),
                digits: granularity.total_digits() + 1,
                allowed: granularity.total_digits(),
            });
        }
        Ok(Self {
            primary: self.primary,
            variant: Variant {
                sense: self.variant.sense,
                insertion,
            },
        })
    }
}

impl Ord for CompositeIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .cmp(&other.primary)
            .then_with(|| self.variant.cmp(&other.variant))
    }
}

impl PartialOrd for CompositeIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
