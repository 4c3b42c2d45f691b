pub mod answers;
pub mod occurrences;
pub mod questions;
pub mod responses;

use std::collections::HashMap;

use itertools::Itertools;
use serde::Serialize;

use super::normalize::Line;
use super::scanner::{Location, Scanner, SectionKey};
use super::vocab::{fold, Vocabulary};
use answers::{AnswerCapture, FieldAnswer};
use occurrences::{detect_in_file_name, Occurrence, OccurrenceDetector};
use questions::QuestionCapture;
use responses::{KeywordResponses, ResponseCapture};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub key: SectionKey,
    pub question: String,
    pub responses: Vec<KeywordResponses>,
}

impl Section {
    pub fn paragraphs_for(&self, keyword: &str) -> &[String] {
        self.responses
            .iter()
            .find(|r| r.keyword == keyword)
            .map(|r| r.paragraphs.as_slice())
            .unwrap_or(&[])
    }

    /// Paragraphs stored for `keyword`, separated by a blank line.
    pub fn joined_response(&self, keyword: &str) -> Option<String> {
        let paragraphs = self.paragraphs_for(keyword);
        if paragraphs.is_empty() {
            None
        } else {
            Some(paragraphs.join("\n\n"))
        }
    }

    fn absorb(&mut self, other: Section) {
        if self.question.is_empty() {
            self.question = other.question;
        }
        for incoming in other.responses {
            match self.responses.iter_mut().find(|r| r.keyword == incoming.keyword) {
                Some(existing) => {
                    for paragraph in incoming.paragraphs {
                        let folded = fold(&paragraph);
                        if !existing.paragraphs.iter().any(|p| fold(p) == folded) {
                            existing.paragraphs.push(paragraph);
                        }
                    }
                }
                None => self.responses.push(incoming),
            }
        }
    }
}

/// One deduplicated occurrence joined to its section's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordHit {
    pub keyword: String,
    pub location: Location,
    /// Section question, or the location label for cover and file-name hits.
    pub question: String,
    pub response: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentExtraction {
    pub source: String,
    pub identifier: Option<String>,
    pub sections: Vec<Section>,
    /// File-name occurrences first, then content occurrences deduplicated by
    /// (keyword, location) in order of first appearance.
    pub occurrences: Vec<Occurrence>,
    pub hits: Vec<KeywordHit>,
    /// One entry per configured answer field.
    pub answers: Vec<FieldAnswer>,
    pub failed_pages: usize,
}

impl DocumentExtraction {
    #[cfg(test)]
    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key.as_str() == key)
    }

    pub fn has_occurrences(&self) -> bool {
        !self.occurrences.is_empty()
    }
}

/// Run one scanner pass over `lines` with every listener attached and
/// assemble the per-document result.
pub fn extract_document(
    vocab: &Vocabulary,
    source: &str,
    identifier: Option<String>,
    lines: &[Line],
) -> DocumentExtraction {
    let mut question_capture = QuestionCapture::new();
    let mut response_capture = ResponseCapture::new(&vocab.keywords, &vocab.response_start);
    let mut detector = OccurrenceDetector::new(&vocab.keywords, source);
    let mut answer_capture = AnswerCapture::new(&vocab.answers, &vocab.response_start);

    Scanner::run(
        &vocab.stop_words,
        lines,
        &mut [
            &mut question_capture,
            &mut response_capture,
            &mut detector,
            &mut answer_capture,
        ],
    );

    let sections = build_sections(question_capture.into_questions(), response_capture.into_responses());

    let content = detector
        .into_occurrences()
        .into_iter()
        .unique_by(|o| (o.keyword.clone(), o.location.clone()));
    let occurrences: Vec<Occurrence> = detect_in_file_name(&vocab.keywords, source)
        .into_iter()
        .chain(content)
        .collect();

    let hits = occurrences.iter().map(|o| join_hit(o, &sections)).collect();

    DocumentExtraction {
        source: source.to_string(),
        identifier,
        sections,
        occurrences,
        hits,
        answers: answer_capture.into_answers(),
        failed_pages: 0,
    }
}

fn build_sections(
    questions: Vec<(SectionKey, String)>,
    responses: Vec<(SectionKey, Vec<KeywordResponses>)>,
) -> Vec<Section> {
    let mut index: HashMap<SectionKey, usize> = HashMap::new();
    let mut sections: Vec<Section> = Vec::new();

    // Both captures saw the same boundaries, so entries line up one to one.
    for ((key, question), (_, responses)) in questions.into_iter().zip(responses) {
        let section = Section {
            key,
            question,
            responses,
        };
        // A repeated header folds into the first section with that key.
        match index.get(&section.key) {
            Some(&idx) => sections[idx].absorb(section),
            None => {
                index.insert(section.key.clone(), sections.len());
                sections.push(section);
            }
        }
    }

    sections
}

fn join_hit(occurrence: &Occurrence, sections: &[Section]) -> KeywordHit {
    let section = occurrence
        .location
        .section()
        .and_then(|key| sections.iter().find(|s| &s.key == key));

    let (question, response) = match section {
        Some(s) => (s.question.clone(), s.joined_response(&occurrence.keyword)),
        None => (occurrence.location.label().to_string(), None),
    };

    KeywordHit {
        keyword: occurrence.keyword.clone(),
        location: occurrence.location.clone(),
        question,
        response,
        source: occurrence.source.clone(),
    }
}

/// Row of the corpus-wide question list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionRow {
    pub document: String,
    pub section: String,
    pub question: String,
}

/// Non-empty section questions of one document.
pub fn question_rows(doc: &DocumentExtraction) -> Vec<QuestionRow> {
    doc.sections
        .iter()
        .filter(|s| !s.question.is_empty())
        .unique_by(|s| (s.key.clone(), fold(&s.question)))
        .map(|s| QuestionRow {
            document: doc.source.clone(),
            section: s.key.to_string(),
            question: s.question.clone(),
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::normalize::normalize_pages;
    use crate::parser::extract::answers::AnswerSpec;
    use crate::parser::vocab::{KeywordSet, LineWords};

    fn answer_spec(name: &str, phrase: &str, stop: &str) -> AnswerSpec {
        AnswerSpec::new(name, &[phrase.to_string()], &[stop.to_string()], &[], " | ").unwrap()
    }

    fn vocab() -> Vocabulary {
        Vocabulary {
            keywords: KeywordSet::new(["Blis", "Vistar"]).unwrap(),
            stop_words: LineWords::new(["Comments", "Response", "Risks"]),
            response_start: LineWords::new(["Response"]),
            answers: vec![
                answer_spec(
                    "Contain Personal Data",
                    "Does this processing activity involve Personal Data?",
                    "Justification",
                ),
                answer_spec("Recipients", "Which third parties receive", "Notes"),
                answer_spec("Description", "Provide a detailed description", "Risks"),
            ],
        }
    }

    fn extract(source: &str, pages: &[&str]) -> DocumentExtraction {
        let lines = normalize_pages(pages.iter().copied());
        extract_document(&vocab(), source, None, &lines)
    }

    #[test]
    fn round_trip_section() {
        let doc = extract(
            "assessment_77.pdf",
            &["3.2 Whose data is involved?\nResponse\nWe use Blis data.\n4.1 Next question"],
        );
        assert_eq!(doc.sections.len(), 2);
        let s = doc.section("3.2").unwrap();
        assert_eq!(s.question, "Whose data is involved?");
        assert_eq!(s.paragraphs_for("Blis"), ["We use Blis data.".to_string()]);
        assert!(doc.section("4.1").unwrap().responses.is_empty());

        assert_eq!(doc.hits.len(), 1);
        let hit = &doc.hits[0];
        assert_eq!(hit.location.label(), "3.2");
        assert_eq!(hit.question, "Whose data is involved?");
        assert_eq!(hit.response.as_deref(), Some("We use Blis data."));
    }

    #[test]
    fn cover_occurrence_only() {
        let doc = extract("x_1.pdf", &["Powered by Vistar\n1.1 First question"]);
        assert_eq!(doc.occurrences.len(), 1);
        assert_eq!(doc.occurrences[0].keyword, "Vistar");
        assert_eq!(doc.occurrences[0].location, Location::Cover);
        assert_eq!(doc.hits[0].question, "Cover");
        assert_eq!(doc.hits[0].response, None);
    }

    #[test]
    fn file_name_occurrence_without_content() {
        let doc = extract("Blis review_42.pdf", &["1.1 Anything?\nResponse\nNo."]);
        assert_eq!(doc.occurrences.len(), 1);
        assert_eq!(doc.occurrences[0].location, Location::Filename);
        assert_eq!(doc.hits[0].question, "Filename");
        assert!(doc.has_occurrences());
    }

    #[test]
    fn content_occurrences_deduplicated_per_location() {
        let doc = extract(
            "Blis_9.pdf",
            &["Blis cover\nBlis again\n1.1 Q\nBlis\nVistar", "Blis on page two\n1.2 Q\nBlis"],
        );
        let labels: Vec<(String, String)> = doc
            .occurrences
            .iter()
            .map(|o| (o.keyword.clone(), o.location.to_string()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("Blis".to_string(), "Filename".to_string()),
                ("Blis".to_string(), "Cover".to_string()),
                ("Blis".to_string(), "1.1".to_string()),
                ("Vistar".to_string(), "1.1".to_string()),
                ("Blis".to_string(), "1.2".to_string()),
            ]
        );
    }

    #[test]
    fn responses_joined_with_blank_line() {
        let doc = extract("d_1.pdf", &["1.1 Q\nResponse\nBlis one.\n\nBlis two."]);
        assert_eq!(doc.hits[0].response.as_deref(), Some("Blis one.\n\nBlis two."));
    }

    #[test]
    fn repeated_header_folds_into_first() {
        let doc = extract(
            "d_1.pdf",
            &["2.1\n2.1 Who receives data?\nResponse\nBlis receives it."],
        );
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].question, "Who receives data?");
        assert_eq!(doc.sections[0].paragraphs_for("Blis").len(), 1);
    }

    #[test]
    fn extraction_is_idempotent() {
        let pages = ["Vistar\n1.1 Q\nResponse\nBlis a.\n\nVistar b.", "2.1 Q2\nBlis"];
        let a = serde_json::to_string(&extract("Blis_3.pdf", &pages)).unwrap();
        let b = serde_json::to_string(&extract("Blis_3.pdf", &pages)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn question_rows_skip_empty() {
        let doc = extract("d_1.pdf", &["1.1 First?\n1.2\n1.3 Third?"]);
        let rows = question_rows(&doc);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].section, "1.3");
        assert_eq!(rows[1].document, "d_1.pdf");
    }

    #[test]
    fn questionnaire_fixture() {
        let raw = std::fs::read_to_string("tests/fixtures/vendor_assessment.txt").unwrap();
        let pages: Vec<&str> = raw.split('\x0C').collect();
        let doc = extract("Vendor Assessment_1042.pdf", &pages);

        assert!(doc.sections.iter().all(|s| {
            let (major, minor) = s.key.as_str().split_once('.').unwrap();
            (1..=2).contains(&major.len()) && (1..=2).contains(&minor.len())
        }));
        assert_eq!(doc.section("1.1").unwrap().question, "Project name");
        assert_eq!(
            doc.section("2.1").unwrap().question,
            "Which third parties receive personal data from this activity?"
        );
        assert_eq!(
            doc.section("2.1").unwrap().paragraphs_for("Blis"),
            ["Location signals are shared with Blis for audience measurement.".to_string()]
        );
        assert_eq!(doc.section("2.1").unwrap().paragraphs_for("Vistar").len(), 1);
        assert!(doc.occurrences.iter().any(|o| o.keyword == "Vistar" && o.location == Location::Cover));
        assert_eq!(doc.section("3.1").unwrap().question, "How long is the data retained?");

        let answers: Vec<(&str, Option<&str>)> = doc
            .answers
            .iter()
            .map(|a| (a.field.as_str(), a.answer.as_deref()))
            .collect();
        assert_eq!(
            answers,
            vec![
                ("Contain Personal Data", Some("Yes")),
                (
                    "Recipients",
                    Some("Location signals are shared with Blis for audience measurement. | Vistar receives hashed device identifiers.")
                ),
                ("Description", None),
            ]
        );
    }
}
