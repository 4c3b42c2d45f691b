use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parser::normalize::Line;
use crate::parser::scanner::{LineListener, ScanState, SectionKey, SectionPhase};
use crate::parser::vocab::{fold, LineWords};

// Noise that PDF exports interleave with answers: print dates, times, page counters.
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").unwrap());
static YEAR_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{4}\s+\d{1,2}:\d{2}(?:\s*[ap]m)?\b").unwrap());
static MONTH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},\s+\d{4}\b")
        .unwrap()
});
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{1,2}:\d{2}(?:\s*[ap]m)?\b").unwrap());
static PAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpage\s*\d+\b").unwrap());
static FRACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\s*/\s*\d+\b").unwrap());

const EDGE_PUNCT: &[char] = &['|', ';', ',', '-', ' '];

/// Whole-phrase alternation, case-insensitive, bounded by non-alphanumerics.
fn phrase_regex(phrases: &[String]) -> Result<Option<Regex>, regex::Error> {
    let alternatives: Vec<String> = phrases
        .iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .map(|p| regex::escape(&p).replace(' ', r"\s+"))
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!(
        r"(?i)(?:^|[^\p{{L}}\p{{N}}])(?:{})(?:[^\p{{L}}\p{{N}}]|$)",
        alternatives.join("|")
    );
    Regex::new(&pattern).map(Some)
}

/// One named answer: the response text of any section whose question
/// contains one of `phrases`, cut at the first stop string.
#[derive(Debug, Clone)]
pub struct AnswerSpec {
    name: String,
    phrases: Vec<String>,
    stop_re: Option<Regex>,
    remove_re: Option<Regex>,
    separator: String,
}

impl AnswerSpec {
    pub fn new(
        name: &str,
        phrases: &[String],
        stop_strings: &[String],
        remove_phrases: &[String],
        separator: &str,
    ) -> Result<Self, regex::Error> {
        Ok(AnswerSpec {
            name: name.trim().to_string(),
            phrases: phrases.iter().map(|p| fold(p)).filter(|p| !p.is_empty()).collect(),
            stop_re: phrase_regex(stop_strings)?,
            remove_re: phrase_regex(remove_phrases)?,
            separator: separator.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn asks(&self, folded_question: &str) -> bool {
        self.phrases.iter().any(|p| folded_question.contains(p.as_str()))
    }

    /// Text before the first stop string, and whether one was found.
    fn cut<'t>(&self, text: &'t str) -> (&'t str, bool) {
        match self.stop_re.as_ref().and_then(|re| re.find(text)) {
            Some(m) => (&text[..m.start()], true),
            None => (text, false),
        }
    }

    /// Strip noise from each line, drop empty and repeated lines, join.
    pub fn clean(&self, lines: &[String]) -> Option<String> {
        let mut seen = HashSet::new();
        let kept: Vec<String> = lines
            .iter()
            .map(|line| self.strip_noise(line))
            .filter(|line| !line.is_empty() && seen.insert(fold(line)))
            .collect();
        if kept.is_empty() {
            None
        } else {
            Some(kept.join(&self.separator))
        }
    }

    fn strip_noise(&self, line: &str) -> String {
        let mut text = match &self.remove_re {
            Some(re) => re.replace_all(line, " ").into_owned(),
            None => line.to_string(),
        };
        for re in [&*DATE_RE, &*YEAR_TIME_RE, &*MONTH_DATE_RE, &*TIME_RE, &*PAGE_RE, &*FRACTION_RE] {
            text = re.replace_all(&text, " ").into_owned();
        }
        text.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(EDGE_PUNCT)
            .to_string()
    }
}

/// Answer of one configured field for one document or identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAnswer {
    pub field: String,
    pub answer: Option<String>,
}

/// Combine answers field by field, keeping distinct texts in order.
pub fn merge_answers<'a, I>(answers: I) -> Vec<FieldAnswer>
where
    I: IntoIterator<Item = &'a [FieldAnswer]>,
{
    let mut merged: Vec<(String, Vec<String>)> = Vec::new();
    for list in answers {
        for fa in list {
            let idx = match merged.iter().position(|(f, _)| f == &fa.field) {
                Some(idx) => idx,
                None => {
                    merged.push((fa.field.clone(), Vec::new()));
                    merged.len() - 1
                }
            };
            if let Some(text) = &fa.answer {
                let parts = &mut merged[idx].1;
                if !parts.iter().any(|p| fold(p) == fold(text)) {
                    parts.push(text.clone());
                }
            }
        }
    }
    merged
        .into_iter()
        .map(|(field, parts)| FieldAnswer {
            field,
            answer: if parts.is_empty() { None } else { Some(parts.join("; ")) },
        })
        .collect()
}

struct OpenAnswer {
    spec: usize,
    lines: Vec<String>,
    stopped: bool,
}

/// Collects the configured answer fields. A field arms when the section's
/// question contains one of its phrases; capture starts after the
/// response-start line and runs to a stop string or the next header.
pub struct AnswerCapture<'a> {
    specs: &'a [AnswerSpec],
    start_words: &'a LineWords,
    question: String,
    capturing: bool,
    open: Vec<OpenAnswer>,
    found: Vec<Vec<String>>,
}

impl<'a> AnswerCapture<'a> {
    pub fn new(specs: &'a [AnswerSpec], start_words: &'a LineWords) -> Self {
        AnswerCapture {
            specs,
            start_words,
            question: String::new(),
            capturing: false,
            open: Vec::new(),
            found: vec![Vec::new(); specs.len()],
        }
    }

    /// One entry per configured field, in configuration order. Several
    /// matching sections are joined with "; ".
    pub fn into_answers(self) -> Vec<FieldAnswer> {
        self.specs
            .iter()
            .zip(self.found)
            .map(|(spec, parts)| FieldAnswer {
                field: spec.name().to_string(),
                answer: if parts.is_empty() { None } else { Some(parts.join("; ")) },
            })
            .collect()
    }

    fn seal(&mut self) {
        for open in self.open.drain(..) {
            let Some(text) = self.specs[open.spec].clean(&open.lines) else {
                continue;
            };
            let parts = &mut self.found[open.spec];
            if !parts.iter().any(|p| fold(p) == fold(&text)) {
                parts.push(text);
            }
        }
        self.question.clear();
        self.capturing = false;
    }

    fn arm(&mut self) {
        for (idx, spec) in self.specs.iter().enumerate() {
            if spec.asks(&self.question) && !self.open.iter().any(|o| o.spec == idx) {
                self.open.push(OpenAnswer {
                    spec: idx,
                    lines: Vec::new(),
                    stopped: false,
                });
            }
        }
    }
}

impl LineListener for AnswerCapture<'_> {
    fn on_section_boundary(&mut self, _closed: Option<&SectionKey>, _opened: &SectionKey) {
        self.seal();
    }

    fn on_line(&mut self, line: &Line, state: &ScanState) {
        match state.phase() {
            None => {}
            Some(SectionPhase::Question) => {
                if !self.question.is_empty() {
                    self.question.push(' ');
                }
                self.question.push_str(&fold(&line.text));
                self.arm();
            }
            Some(_) if self.open.is_empty() => {}
            Some(_) if !self.capturing => {
                self.capturing = self.start_words.matches(&line.text);
            }
            Some(_) => {
                for open in self.open.iter_mut().filter(|o| !o.stopped) {
                    let (kept, stopped) = self.specs[open.spec].cut(&line.text);
                    let kept = kept.trim();
                    if !kept.is_empty() {
                        open.lines.push(kept.to_string());
                    }
                    open.stopped = stopped;
                }
            }
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

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn personal_data() -> AnswerSpec {
        AnswerSpec::new(
            "Contain Personal Data",
            &strings(&["Does this processing activity involve Personal Data?"]),
            &strings(&["Justification"]),
            &[],
            " | ",
        )
        .unwrap()
    }

    fn answers(specs: &[AnswerSpec], raw: &str) -> Vec<FieldAnswer> {
        let stops = LineWords::new(["Comments", "Response", "Risks"]);
        let starts = LineWords::new(["Response"]);
        let lines = normalize_page(raw, 0);
        let mut capture = AnswerCapture::new(specs, &starts);
        Scanner::run(&stops, &lines, &mut [&mut capture]);
        capture.into_answers()
    }

    #[test]
    fn answer_cut_at_stop_string() {
        let found = answers(
            &[personal_data()],
            "2.1 Does this processing activity involve\nPersonal Data?\nResponse\nYes Justification: we store emails\nmore justification",
        );
        assert_eq!(found[0].field, "Contain Personal Data");
        assert_eq!(found[0].answer.as_deref(), Some("Yes"));
    }

    #[test]
    fn answer_ends_at_next_header() {
        let found = answers(
            &[personal_data()],
            "2.1 Does this processing activity involve Personal Data?\nResponse\nYes\n2.2 Other question\nResponse\nNo",
        );
        assert_eq!(found[0].answer.as_deref(), Some("Yes"));
    }

    #[test]
    fn unmatched_field_is_none() {
        let found = answers(&[personal_data()], "1.1 Project name\nResponse\nPilot");
        assert_eq!(found, vec![FieldAnswer { field: "Contain Personal Data".into(), answer: None }]);
    }

    #[test]
    fn noise_and_repeated_lines_removed() {
        let spec = AnswerSpec::new(
            "Whose data",
            &strings(&["Whose data is involved"]),
            &strings(&["Risks"]),
            &strings(&["Select all that apply"]),
            " | ",
        )
        .unwrap();
        let found = answers(
            &[spec],
            "3.2 Whose data is involved in this activity?\nResponse\nSelect all that apply\nEmployees\n02/04/2025 10:15 AM\nEmployees\nCustomers 4/12\nRisks\nNone noted",
        );
        assert_eq!(found[0].answer.as_deref(), Some("Employees | Customers"));
    }

    #[test]
    fn several_sections_joined() {
        let found = answers(
            &[personal_data()],
            "1.1 Does this processing activity involve Personal Data?\nResponse\nYes\n4.1 Does this processing activity involve Personal Data?\nResponse\nNo",
        );
        assert_eq!(found[0].answer.as_deref(), Some("Yes; No"));
    }

    #[test]
    fn merge_keeps_distinct_answers() {
        let a = vec![
            FieldAnswer { field: "A".into(), answer: Some("Yes".into()) },
            FieldAnswer { field: "B".into(), answer: None },
        ];
        let b = vec![
            FieldAnswer { field: "A".into(), answer: Some("yes".into()) },
            FieldAnswer { field: "B".into(), answer: Some("Staff".into()) },
        ];
        let merged = merge_answers([a.as_slice(), b.as_slice()]);
        assert_eq!(merged[0].answer.as_deref(), Some("Yes"));
        assert_eq!(merged[1].answer.as_deref(), Some("Staff"));
    }
}
