pub mod text_cleanup;

#[derive(
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Copy,
    schemars::JsonSchema,
)]
pub enum PartOfSpeech {
    #[serde(rename = "ADJ")]
    Adj, // adjective
    #[serde(rename = "ADP")]
    Adp, // adposition
    #[serde(rename = "ADV")]
    Adv, // adverb
    #[serde(rename = "AUX")]
    Aux, // auxiliary
    #[serde(rename = "CCONJ")]
    Cconj, // coordinating conjunction
    #[serde(rename = "DET")]
    Det, // determiner
    #[serde(rename = "INTJ")]
    Intj, // interjection
    #[serde(rename = "NOUN")]
    Noun, // noun
    #[serde(rename = "NUM")]
    Num, // numeral
    #[serde(rename = "PART")]
    Part, // particle
    #[serde(rename = "PRON")]
    Pron, // pronoun
    #[serde(rename = "PROPN")]
    Propn, // proper noun
    #[serde(rename = "PUNCT")]
    Punct, // punctuation
    #[serde(rename = "SCONJ")]
    Sconj, // subordinating conjunction
    #[serde(rename = "SYM")]
    Sym, // symbol
    #[serde(rename = "VERB")]
    Verb, // verb
    #[serde(rename = "SPACE")]
    Space, // space
    #[serde(rename = "X")]
    X, // other
}

/// One token of a dependency-parsed sentence.
///
/// `head` is the 0-based position of the token this one attaches to.
/// The root of the sentence points at itself.
#[derive(
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    Eq,
    PartialEq,
    schemars::JsonSchema,
)]
pub struct DocToken {
    pub text: String,
    pub whitespace: String,
    pub pos: PartOfSpeech,
    pub lemma: String,
    /// Dependency label as emitted by the parser (`svp`, `nsubj`, `compound:prt`, ...)
    pub dep: String,
    pub head: usize,
}

/// A sentence together with its dependency parse
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, Eq, PartialEq)]
pub struct ParsedSentence {
    pub sentence: String,
    pub doc: Vec<DocToken>,
}

impl ParsedSentence {
    /// The token a given token attaches to, if the head index is in range
    pub fn head_of(&self, token_index: usize) -> Option<&DocToken> {
        let head = self.doc.get(token_index)?.head;
        self.doc.get(head)
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    schemars::JsonSchema,
)]
pub enum Language {
    English,
    German,
    Russian,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::English => write!(f, "English"),
            Language::German => write!(f, "German"),
            Language::Russian => write!(f, "Russian"),
        }
    }
}

/// The language being studied and the language the learner already knows
#[derive(Copy, Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Course {
    pub target_language: Language,
    pub native_language: Language,
}

impl Default for Course {
    fn default() -> Self {
        Self {
            target_language: Language::German,
            native_language: Language::English,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, pos: PartOfSpeech, dep: &str, head: usize) -> DocToken {
        DocToken {
            text: text.to_string(),
            whitespace: " ".to_string(),
            pos,
            lemma: text.to_lowercase(),
            dep: dep.to_string(),
            head,
        }
    }

    #[test]
    fn test_head_of() {
        let parsed = ParsedSentence {
            sentence: "Er steht auf".to_string(),
            doc: vec![
                token("Er", PartOfSpeech::Pron, "sb", 1),
                token("steht", PartOfSpeech::Verb, "ROOT", 1),
                token("auf", PartOfSpeech::Adp, "svp", 1),
            ],
        };
        assert_eq!(parsed.head_of(2).unwrap().text, "steht");
        assert_eq!(parsed.head_of(1).unwrap().text, "steht");
        assert!(parsed.head_of(3).is_none());
    }

    #[test]
    fn test_part_of_speech_serde_names() {
        let json = serde_json::to_string(&PartOfSpeech::Verb).unwrap();
        assert_eq!(json, "\"VERB\"");
        let pos: PartOfSpeech = serde_json::from_str("\"PROPN\"").unwrap();
        assert_eq!(pos, PartOfSpeech::Propn);
    }

    #[test]
    fn test_course_serde() {
        let course: Course =
            serde_json::from_str(r#"{"target_language":"Russian","native_language":"English"}"#)
                .unwrap();
        assert_eq!(course.target_language, Language::Russian);
        assert_eq!(course.target_language.to_string(), "Russian");
    }
}
