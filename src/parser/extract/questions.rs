use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::parser::normalize::Line;
use crate::parser::scanner::{LineListener, ScanState, SectionKey, SectionPhase};
use crate::parser::vocab::fold;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*q(?:uestion)?\s*[:.)]\s*").unwrap());
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[•\u{2022}\u{25AA}\-]\s+").unwrap());
static ENUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+\)|\(\d+\))\s*").unwrap());
static LEADING_SEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[:\-.]\s*").unwrap());

/// Strip leading labels, bullets and stray separators from a question line.
pub fn clean_question_text(text: &str) -> String {
    let text = LABEL_RE.replace(text, "");
    let text = BULLET_RE.replace(&text, "");
    let text = ENUM_RE.replace(&text, "");
    let text = LEADING_SEP_RE.replace(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct OpenQuestion {
    key: SectionKey,
    parts: Vec<String>,
    seen: HashSet<String>,
}

/// Accumulates the question text of every section: the header's trailing
/// text plus following lines, until the scanner leaves the question phase.
#[derive(Default)]
pub struct QuestionCapture {
    open: Option<OpenQuestion>,
    done: Vec<(SectionKey, String)>,
}

impl QuestionCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per section in document order; sections that never got a
    /// question carry an empty string.
    pub fn into_questions(self) -> Vec<(SectionKey, String)> {
        self.done
    }

    fn seal(&mut self) {
        if let Some(open) = self.open.take() {
            self.done.push((open.key, open.parts.join(" ")));
        }
    }
}

impl LineListener for QuestionCapture {
    fn on_section_boundary(&mut self, _closed: Option<&SectionKey>, opened: &SectionKey) {
        self.seal();
        self.open = Some(OpenQuestion {
            key: opened.clone(),
            parts: Vec::new(),
            seen: HashSet::new(),
        });
    }

    fn on_line(&mut self, line: &Line, state: &ScanState) {
        if state.phase() != Some(SectionPhase::Question) {
            return;
        }
        let Some(open) = self.open.as_mut() else {
            return;
        };

        let cleaned = clean_question_text(&line.text);
        if cleaned.is_empty() {
            return;
        }
        if open.seen.insert(fold(&cleaned)) {
            open.parts.push(cleaned);
        }
    }

    fn finalize(&mut self, _open: Option<&SectionKey>) {
        self.seal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::normalize::normalize_page;
    use crate::parser::scanner::Scanner;
    use crate::parser::vocab::LineWords;

    fn questions(raw: &str) -> Vec<(String, String)> {
        let stops = LineWords::new(["Comments", "Response", "Risks"]);
        let lines = normalize_page(raw, 0);
        let mut capture = QuestionCapture::new();
        Scanner::run(&stops, &lines, &mut [&mut capture]);
        capture
            .into_questions()
            .into_iter()
            .map(|(k, q)| (k.to_string(), q))
            .collect()
    }

    #[test]
    fn same_line_question() {
        let q = questions("3.2 Whose data is involved?\nResponse\nWe use Blis data.");
        assert_eq!(q, vec![("3.2".to_string(), "Whose data is involved?".to_string())]);
    }

    #[test]
    fn multi_line_question_until_stop_word() {
        let q = questions("1.1 Describe the data\nflows in detail.\ncomments\nnot a question");
        assert_eq!(q[0].1, "Describe the data flows in detail.");
    }

    #[test]
    fn duplicate_lines_dropped() {
        let q = questions("1.1 Who owns it?\nwho   OWNS it?\nAnd why?\nRisks");
        assert_eq!(q[0].1, "Who owns it? And why?");
    }

    #[test]
    fn pending_header_uses_next_line() {
        let q = questions("2.4\nQ: Is data shared?\nResponse\nYes");
        assert_eq!(q, vec![("2.4".to_string(), "Is data shared?".to_string())]);
    }

    #[test]
    fn pending_header_without_question() {
        let q = questions("2.4\n2.5 Next");
        assert_eq!(q[0], ("2.4".to_string(), String::new()));
        assert_eq!(q[1], ("2.5".to_string(), "Next".to_string()));
    }

    #[test]
    fn cover_lines_ignored() {
        let q = questions("Vendor questionnaire\nPrepared by Vistar\n1.1 First");
        assert_eq!(q, vec![("1.1".to_string(), "First".to_string())]);
    }

    #[test]
    fn clean_labels_and_bullets() {
        assert_eq!(clean_question_text("Question. What is it?"), "What is it?");
        assert_eq!(clean_question_text("• Which vendors?"), "Which vendors?");
        assert_eq!(clean_question_text("(2) Which vendors?"), "Which vendors?");
        assert_eq!(clean_question_text(": dangling"), "dangling");
        assert_eq!(clean_question_text("Quarterly review"), "Quarterly review");
    }
}
