use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::parser::extract::answers::AnswerSpec;
use crate::parser::vocab::{fold, KeywordSet, LineWords, Vocabulary};

const DEFAULT_FILE: &str = "qscan";
const ENV_PREFIX: &str = "QSCAN";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,
    #[serde(default = "default_response_start_words")]
    pub response_start_words: Vec<String>,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub corpus_dir: Option<PathBuf>,
    /// Master column holding the identifier; the first column when unset.
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_answer_fields")]
    pub answer_fields: Vec<AnswerFieldSettings>,
}

/// A named answer pulled from the response to any of `phrases`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AnswerFieldSettings {
    pub name: String,
    pub phrases: Vec<String>,
    #[serde(default)]
    pub stop_strings: Vec<String>,
    #[serde(default)]
    pub remove_phrases: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_keywords() -> Vec<String> {
    vec!["Blis".to_string(), "Vistar".to_string()]
}

fn default_stop_words() -> Vec<String> {
    vec!["Comments".to_string(), "Response".to_string(), "Risks".to_string()]
}

fn default_response_start_words() -> Vec<String> {
    vec!["Response".to_string()]
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/qscan.sqlite")
}

fn default_batch_size() -> usize {
    500
}

fn default_separator() -> String {
    " | ".to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_answer_fields() -> Vec<AnswerFieldSettings> {
    vec![
        AnswerFieldSettings {
            name: "Contain Personal Data".to_string(),
            phrases: strings(&[
                "Does this initiative involve the collection, use, storage, or sharing of Personal Data?",
                "Does this processing activity involve Personal Data?",
                "Does this processing activity involve Personal Information?",
            ]),
            stop_strings: strings(&["Justification"]),
            remove_phrases: Vec::new(),
            separator: default_separator(),
        },
        AnswerFieldSettings {
            name: "What Personal Data is involved".to_string(),
            phrases: strings(&[
                "Whose/What Personal Data is involved in this activity?",
                "Whose data is involved in this activity?",
            ]),
            stop_strings: strings(&[
                "Risks",
                "Comments",
                "What is the estimated number of data subjects whose data will be processed?",
                "What operations will be performed on the personal data?",
                "What operations will be performed on the data?",
                "Assessment questions",
            ]),
            remove_phrases: strings(&[
                "Select all that apply",
                "Select the groups of individuals you are processing data about",
                "If you did not select any data elements in the previous question",
                "Assessment questions",
            ]),
            separator: default_separator(),
        },
        AnswerFieldSettings {
            name: "Description".to_string(),
            phrases: strings(&[
                "Provide a detailed, non-technical description of the objectives and goals of the activity.",
                "Provide a brief, non-technical description of the project objectives for your system, product, or service.",
            ]),
            stop_strings: strings(&["Risks", "Comments", "Assessment questions"]),
            remove_phrases: strings(&["Assessment questions"]),
            separator: " ".to_string(),
        },
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            keywords: default_keywords(),
            stop_words: default_stop_words(),
            response_start_words: default_response_start_words(),
            db_path: default_db_path(),
            corpus_dir: None,
            id_column: None,
            batch_size: default_batch_size(),
            answer_fields: default_answer_fields(),
        }
    }
}

impl Settings {
    /// Defaults, then `path` (or `qscan.toml` if present), then `QSCAN_*`
    /// environment variables. List variables are comma-separated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => ::config::File::from(p).required(true),
            None => ::config::File::with_name(DEFAULT_FILE).required(false),
        };

        let settings: Settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("keywords")
                    .with_list_parse_key("stop_words")
                    .with_list_parse_key("response_start_words"),
            )
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")?;

        settings.validated()
    }

    /// Trims list entries, drops empty ones and case-insensitive duplicates.
    pub fn validated(mut self) -> Result<Self> {
        self.keywords = clean_list(&self.keywords);
        self.stop_words = clean_list(&self.stop_words);
        self.response_start_words = clean_list(&self.response_start_words);

        if self.keywords.is_empty() {
            bail!("at least one keyword must be configured");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        if self.id_column.as_deref().is_some_and(|c| c.trim().is_empty()) {
            self.id_column = None;
        }

        let mut names = HashSet::new();
        for field in &mut self.answer_fields {
            field.name = field.name.trim().to_string();
            field.phrases = clean_list(&field.phrases);
            field.stop_strings = clean_list(&field.stop_strings);
            field.remove_phrases = clean_list(&field.remove_phrases);
            if field.name.is_empty() {
                bail!("answer field without a name");
            }
            if !names.insert(fold(&field.name)) {
                bail!("answer field {:?} is configured twice", field.name);
            }
            if field.phrases.is_empty() {
                bail!("answer field {:?} has no phrases", field.name);
            }
        }
        Ok(self)
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        Ok(Vocabulary {
            keywords: KeywordSet::new(&self.keywords).context("invalid keyword")?,
            stop_words: LineWords::new(&self.stop_words),
            response_start: LineWords::new(&self.response_start_words),
            answers: self
                .answer_fields
                .iter()
                .map(|f| {
                    AnswerSpec::new(&f.name, &f.phrases, &f.stop_strings, &f.remove_phrases, &f.separator)
                        .with_context(|| format!("invalid answer field {:?}", f.name))
                })
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

fn clean_list(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty() && seen.insert(fold(s)))
        .collect()
}
