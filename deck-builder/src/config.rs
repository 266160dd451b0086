use std::path::{Path, PathBuf};

use language_utils::Course;
use serde::{Deserialize, Serialize};

use crate::error::{DeckError, Result};
use crate::index::{CompositeIndex, IndexGranularity};

/// Everything the pipeline can be tuned with, loaded from `deck.toml`.
///
/// Every section is optional; a missing section or key falls back to the
/// values the German deck was originally built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub course: Course,
    pub rare_words: RarityPolicy,
    pub sentence_length: SentenceLength,
    /// Joins the lemmas of a sentence in the deck's lemmatized column
    pub lemma_separator: char,
    pub index: IndexGranularity,
    pub generation: GenerationSettings,
    pub nlp: NlpSettings,
    pub paths: Paths,
    pub split: SplitSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            course: Course::default(),
            rare_words: RarityPolicy::default(),
            sentence_length: SentenceLength::default(),
            lemma_separator: ';',
            index: IndexGranularity::default(),
            generation: GenerationSettings::default(),
            nlp: NlpSettings::default(),
            paths: Paths::default(),
            split: SplitSettings::default(),
        }
    }
}

/// Thresholds that decide whether a sentence introduces enough rare words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RarityPolicy {
    pub min_rare_words_in_sentence: usize,
    pub max_occurrences_in_deck: u32,
}

impl Default for RarityPolicy {
    fn default() -> Self {
        Self {
            min_rare_words_in_sentence: 2,
            max_occurrences_in_deck: 3,
        }
    }
}

/// Inclusive bounds on the character length of a source sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBand {
    pub min: usize,
    pub max: usize,
}

impl LengthBand {
    pub fn contains(&self, sentence: &str) -> bool {
        let length = sentence.chars().count();
        self.min <= length && length <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentenceLength {
    pub min: usize,
    pub max: usize,
    /// Bands for later parts of the deck, applied from `from_index` onwards
    pub tiers: Vec<LengthTier>,
}

impl Default for SentenceLength {
    fn default() -> Self {
        Self {
            min: 60,
            max: 70,
            tiers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthTier {
    pub from_index: u64,
    pub min: usize,
    pub max: usize,
}

impl SentenceLength {
    /// The band that applies to a row: the tier with the highest
    /// `from_index` not above the row's primary index, else the base band.
    pub fn band_for(&self, index: &CompositeIndex) -> LengthBand {
        self.tiers
            .iter()
            .filter(|tier| tier.from_index <= index.primary)
            .max_by_key(|tier| tier.from_index)
            .map(|tier| LengthBand {
                min: tier.min,
                max: tier.max,
            })
            .unwrap_or(LengthBand {
                min: self.min,
                max: self.max,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    /// How many generate → merge → partition rounds `generate` runs
    pub iterations: usize,
    /// Rows per request
    pub block_size: usize,
    /// Upper bound on requests per round
    pub blocks_per_iteration: usize,
    pub concurrency: usize,
    /// Fixes the shuffle of pending rows when set
    pub seed: Option<u64>,
    /// The deck already carries a part of speech for every row
    pub has_part_of_speech: bool,
    /// The deck already carries a translation for every row
    pub has_translation: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            iterations: 20,
            block_size: 70,
            blocks_per_iteration: 20,
            concurrency: 8,
            seed: None,
            has_part_of_speech: false,
            has_translation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpSettings {
    pub model: String,
    pub concurrency: usize,
}

impl Default for NlpSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            concurrency: 50,
        }
    }
}

/// File locations. Relative paths are resolved against the directory that
/// holds the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub deck: PathBuf,
    pub word_counts: PathBuf,
    pub baseform_overrides: PathBuf,
    pub parse_cache: PathBuf,
    pub known_words: Option<PathBuf>,
    /// Where batch request/response checkpoints are written
    pub batch_dir: PathBuf,
    /// Response cache for the chat client
    pub llm_cache: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            deck: PathBuf::from("deck.csv"),
            word_counts: PathBuf::from("word-count.csv"),
            baseform_overrides: PathBuf::from("words-bad-baseform.csv"),
            parse_cache: PathBuf::from("parses.jsonl"),
            known_words: None,
            batch_dir: PathBuf::from("batch"),
            llm_cache: PathBuf::from(".cache"),
        }
    }
}

impl Paths {
    fn resolve_against(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.deck);
        resolve(&mut self.word_counts);
        resolve(&mut self.baseform_overrides);
        resolve(&mut self.parse_cache);
        if let Some(known_words) = self.known_words.as_mut() {
            resolve(known_words);
        }
        resolve(&mut self.batch_dir);
        resolve(&mut self.llm_cache);
    }

    pub fn parallel_requests(&self) -> PathBuf {
        self.batch_dir.join("parallel-requests.jsonl")
    }

    pub fn parallel_responses(&self) -> PathBuf {
        self.batch_dir.join("parallel-responses.jsonl")
    }

    pub fn parallel_responses_concatenated(&self) -> PathBuf {
        self.batch_dir.join("parallel-responses-concatenated.csv")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    /// Last primary index of each part; the final part takes the remainder
    pub boundaries: Vec<u64>,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeckError::MissingInput(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        if let Some(base) = path.parent() {
            config.paths.resolve_against(base);
        }
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).map_err(|e| DeckError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let separator = self.lemma_separator;
        if separator.is_alphanumeric() || separator.is_whitespace() || separator == '|' {
            return Err(DeckError::Config(format!(
                "lemma separator `{separator}` must not be alphanumeric, whitespace or `|`"
            )));
        }

        let check_band = |name: &str, min: usize, max: usize| {
            if min > max {
                Err(DeckError::Config(format!(
                    "{name}: minimum length {min} is above maximum {max}"
                )))
            } else {
                Ok(())
            }
        };
        check_band("sentence_length", self.sentence_length.min, self.sentence_length.max)?;
        for tier in &self.sentence_length.tiers {
            check_band(
                &format!("sentence_length tier from {}", tier.from_index),
                tier.min,
                tier.max,
            )?;
        }

        self.index.validate()?;

        let generation = &self.generation;
        if generation.block_size == 0
            || generation.blocks_per_iteration == 0
            || generation.concurrency == 0
        {
            return Err(DeckError::Config(
                "generation block_size, blocks_per_iteration and concurrency must be at least 1"
                    .to_string(),
            ));
        }
        if self.nlp.concurrency == 0 {
            return Err(DeckError::Config(
                "nlp concurrency must be at least 1".to_string(),
            ));
        }

        if !self.split.boundaries.is_sorted() {
            return Err(DeckError::Config(
                "split boundaries must be in ascending order".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use language_utils::Language;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rare_words.min_rare_words_in_sentence, 2);
        assert_eq!(config.rare_words.max_occurrences_in_deck, 3);
        assert_eq!(config.sentence_length.min, 60);
        assert_eq!(config.sentence_length.max, 70);
        assert_eq!(config.lemma_separator, ';');
        assert_eq!(config.index.sense_digits, 3);
        assert_eq!(config.index.insertion_digits, 1);
        assert_eq!(config.generation.block_size, 70);
        assert_eq!(config.generation.blocks_per_iteration, 20);
        assert_eq!(config.generation.iterations, 20);
        assert_eq!(config.course.target_language, Language::German);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r##"
lemma_separator = "#"

[rare_words]
max_occurrences_in_deck = 5

[sentence_length]
min = 40

[[sentence_length.tiers]]
from_index = 3001
min = 70
max = 90

[generation]
seed = 7
"##,
        )
        .unwrap();
        assert_eq!(config.lemma_separator, '#');
        assert_eq!(config.rare_words.max_occurrences_in_deck, 5);
        assert_eq!(config.rare_words.min_rare_words_in_sentence, 2);
        assert_eq!(config.sentence_length.min, 40);
        assert_eq!(config.sentence_length.max, 70);
        assert_eq!(config.generation.seed, Some(7));
        assert_eq!(config.generation.block_size, 70);
    }

    #[test]
    fn test_band_for_tiers() {
        let lengths = SentenceLength {
            min: 60,
            max: 70,
            tiers: vec![
                LengthTier {
                    from_index: 5001,
                    min: 80,
                    max: 100,
                },
                LengthTier {
                    from_index: 3001,
                    min: 70,
                    max: 90,
                },
            ],
        };
        let band = |primary| lengths.band_for(&CompositeIndex::headword(primary));
        assert_eq!(band(1), LengthBand { min: 60, max: 70 });
        assert_eq!(band(3000), LengthBand { min: 60, max: 70 });
        assert_eq!(band(3001), LengthBand { min: 70, max: 90 });
        assert_eq!(band(5001), LengthBand { min: 80, max: 100 });
    }

    #[test]
    fn test_length_band_counts_characters() {
        let band = LengthBand { min: 5, max: 5 };
        assert!(band.contains("Größe"));
        assert!(!band.contains("Grö"));
    }

    #[test]
    fn test_rejects_bad_separator() {
        for separator in ["a", "|", " ", "7"] {
            let toml = format!("lemma_separator = \"{separator}\"");
            assert!(
                matches!(Config::from_toml(&toml), Err(DeckError::Config(_))),
                "{separator:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_inverted_band() {
        let err = Config::from_toml("[sentence_length]\nmin = 80\nmax = 70\n").unwrap_err();
        assert!(matches!(err, DeckError::Config(_)));

        let err = Config::from_toml(
            "[[sentence_length.tiers]]\nfrom_index = 10\nmin = 9\nmax = 3\n",
        )
        .unwrap_err();
        assert!(matches!(err, DeckError::Config(_)));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = Config::from_toml(include_str!("../../deck.toml")).unwrap();
        assert_eq!(config.split.boundaries, vec![3000, 6000]);
        assert_eq!(
            config.sentence_length.band_for(&CompositeIndex::headword(4000)),
            LengthBand { min: 70, max: 90 }
        );
    }

    #[test]
    fn test_rejects_unknown_key() {
        assert!(Config::from_toml("unknown_knob = 1").is_err());
    }

    #[test]
    fn test_load_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.toml");
        std::fs::write(&path, "[paths]\ndeck = \"words/deck.csv\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.paths.deck, dir.path().join("words/deck.csv"));
        assert_eq!(
            config.paths.parallel_requests(),
            dir.path().join("batch/parallel-requests.jsonl")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, DeckError::MissingInput(_)));
    }
}
