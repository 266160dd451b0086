use indexmap::IndexSet;

use crate::baseform::BaseformResolver;
use crate::config::RarityPolicy;
use crate::deck::DeckRow;
use crate::error::{DeckError, Result};
use crate::index::IndexGranularity;
use crate::ledger::WordCountLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { reason: RejectionReason },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// The sentence does not use the word the card is about
    TargetWordMissing { baseform: String },
    TooFewRareWords { found: usize, required: usize },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::TargetWordMissing { baseform } => {
                write!(f, "`{baseform}` is not among the sentence's lemmas")
            }
            RejectionReason::TooFewRareWords { found, required } => {
                write!(f, "{found} rare words, {required} required")
            }
        }
    }
}

/// Decides whether a row's sentence earns its place in the deck.
///
/// A sentence is kept when it uses the row's word and at least
/// `min_rare_words_in_sentence` other lemmas that occur in no more than
/// `max_occurrences_in_deck` rows. A rejected sentence is taken out of the
/// ledger straight away, its own word included, so rows evaluated after it
/// see the deck as if it had never been there.
pub struct Evaluator<'a> {
    resolver: BaseformResolver<'a>,
    policy: RarityPolicy,
    separator: char,
    granularity: IndexGranularity,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        resolver: BaseformResolver<'a>,
        policy: RarityPolicy,
        separator: char,
        granularity: IndexGranularity,
    ) -> Self {
        Self {
            resolver,
            policy,
            separator,
            granularity,
        }
    }

    pub fn evaluate(&self, row: &DeckRow, ledger: &mut WordCountLedger) -> Result<Verdict> {
        let lemmas = row
            .lemmas(self.separator)
            .ok_or_else(|| DeckError::MissingField {
                index: row.index.render(self.granularity),
                word: row.word.clone(),
                field: "lemmatized_sentence",
            })?
            .collect::<Vec<_>>();

        let baseform = self.resolver.resolve(&row.word);

        let verdict = if !lemmas.contains(&baseform.as_str()) {
            Verdict::Rejected {
                reason: RejectionReason::TargetWordMissing { baseform },
            }
        } else {
            let rare_words = lemmas
                .iter()
                .filter(|lemma| **lemma != baseform)
                .filter(|lemma| ledger.count(lemma) <= self.policy.max_occurrences_in_deck)
                .count();
            if rare_words >= self.policy.min_rare_words_in_sentence {
                Verdict::Accepted
            } else {
                Verdict::Rejected {
                    reason: RejectionReason::TooFewRareWords {
                        found: rare_words,
                        required: self.policy.min_rare_words_in_sentence,
                    },
                }
            }
        };

        // the ledger counts each lemma once per row
        if !verdict.is_accepted() {
            for lemma in lemmas.into_iter().collect::<IndexSet<_>>() {
                ledger.decrement(lemma);
            }
        }

        Ok(verdict)
    }
}
