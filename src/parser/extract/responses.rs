use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::parser::normalize::Line;
use crate::parser::scanner::{LineListener, ScanState, SectionKey};
use crate::parser::vocab::{fold, KeywordSet, LineWords};

static SUBHEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Alphabetic}+:?$").unwrap());

/// Response paragraphs of one section that mention a keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordResponses {
    pub keyword: String,
    pub paragraphs: Vec<String>,
}

/// A single alphabetic word ("Notes", "Justification:") reads as a sub-heading
/// and splits paragraphs.
pub fn is_subheading(text: &str) -> bool {
    SUBHEADING_RE.is_match(text.trim())
}

/// Punctuation-only lines ("----------", "* * *") of any length.
fn is_rule(text: &str) -> bool {
    !text.chars().any(char::is_alphanumeric)
}

#[derive(Default)]
struct Paragraph {
    lines: Vec<String>,
    seen: HashSet<String>,
}

impl Paragraph {
    fn push(&mut self, text: &str) {
        if self.seen.insert(fold(text)) {
            self.lines.push(text.to_string());
        }
    }

    fn take_text(&mut self) -> Option<String> {
        self.seen.clear();
        if self.lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.lines).join(" "))
    }
}

struct OpenSection {
    key: SectionKey,
    capturing: bool,
    paragraph: Paragraph,
    // Indexed by keyword position in the vocabulary.
    stored: Vec<Vec<String>>,
    seen: Vec<HashSet<String>>,
}

/// Collects free-text response paragraphs. Capture starts after a line that
/// is exactly a response-start word and runs to the end of the section.
pub struct ResponseCapture<'a> {
    keywords: &'a KeywordSet,
    start_words: &'a LineWords,
    open: Option<OpenSection>,
    done: Vec<(SectionKey, Vec<KeywordResponses>)>,
}

impl<'a> ResponseCapture<'a> {
    pub fn new(keywords: &'a KeywordSet, start_words: &'a LineWords) -> Self {
        ResponseCapture {
            keywords,
            start_words,
            open: None,
            done: Vec::new(),
        }
    }

    /// One entry per section in document order; sections without a matching
    /// paragraph carry an empty list.
    pub fn into_responses(self) -> Vec<(SectionKey, Vec<KeywordResponses>)> {
        self.done
    }

    fn close_paragraph(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let Some(text) = open.paragraph.take_text() else {
            return;
        };

        let folded = fold(&text);
        for keyword in self.keywords.matches(&text) {
            let Some(idx) = self.keywords.position(keyword) else {
                continue;
            };
            if open.seen[idx].insert(folded.clone()) {
                open.stored[idx].push(text.clone());
            }
        }
    }

    fn seal(&mut self) {
        self.close_paragraph();
        let Some(open) = self.open.take() else {
            return;
        };

        let responses: Vec<KeywordResponses> = self
            .keywords
            .names()
            .zip(open.stored)
            .filter(|(_, paragraphs)| !paragraphs.is_empty())
            .map(|(keyword, paragraphs)| KeywordResponses {
                keyword: keyword.to_string(),
                paragraphs,
            })
            .collect();
        self.done.push((open.key, responses));
    }
}

impl LineListener for ResponseCapture<'_> {
    fn on_section_boundary(&mut self, _closed: Option<&SectionKey>, opened: &SectionKey) {
        self.seal();
        let n = self.keywords.len();
        self.open = Some(OpenSection {
            key: opened.clone(),
            capturing: false,
            paragraph: Paragraph::default(),
            stored: vec![Vec::new(); n],
            seen: vec![HashSet::new(); n],
        });
    }

    fn on_line(&mut self, line: &Line, state: &ScanState) {
        if state.key().is_none() {
            return;
        }
        let Some(open) = self.open.as_mut() else {
            return;
        };

        if !open.capturing {
            open.capturing = self.start_words.matches(&line.text);
            return;
        }

        if line.paragraph_break {
            self.close_paragraph();
        }
        if is_rule(&line.text) || is_subheading(&line.text) {
            self.close_paragraph();
            return;
        }
        if let Some(open) = self.open.as_mut() {
            open.paragraph.push(&line.text);
        }
    }

    fn finalize(&mut self, _open: Option<&SectionKey>) {
        self.seal();
    }
}
