use std::path::PathBuf;

/// Errors raised by the deck pipeline.
///
/// Everything here is fatal for the step that raised it: the pipeline is a
/// batch job and a partially written checkpoint is worse than a crash.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("duplicate composite index in deck: {rows:?}")]
    DuplicateIndex { rows: Vec<String> },

    #[error(
        "index `{text}` has {digits} fractional digits but at most {allowed} are allowed"
    )]
    IndexGranularity {
        text: String,
        digits: usize,
        allowed: usize,
    },

    #[error("malformed composite index `{0}`")]
    MalformedIndex(String),

    #[error("malformed deck row {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("row {index} ({word}) is missing `{field}`")]
    MissingField {
        index: String,
        word: String,
        field: &'static str,
    },

    #[error("lemma `{token}` contains the separator `{separator}`")]
    SeparatorCollision { token: String, separator: char },

    #[error("cannot lemmatize an empty sentence")]
    EmptySentence,

    #[error("no dependency parse cached for sentence `{0}`")]
    MissingParse(String),

    #[error("malformed dependency parse for `{sentence}`: {reason}")]
    MalformedParse { sentence: String, reason: String },

    #[error("required input file does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("no rows are waiting for a generated sentence")]
    NothingToGenerate,

    #[error("none of the {responses} responses contained a parseable row")]
    EmptyResponseBatch { responses: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = DeckError> = std::result::Result<T, E>;
