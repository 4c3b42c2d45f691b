pub mod extract;
pub mod normalize;
pub mod scanner;
pub mod vocab;

use tracing::warn;

use crate::corpus::LoadedDocument;
use extract::DocumentExtraction;
use vocab::Vocabulary;

/// Page text → normalized lines → one scanner pass with the question,
/// response, occurrence and answer listeners attached.
///
/// A page that failed to extract is logged and treated as empty; the rest of
/// the document is still processed.
pub fn process_document(vocab: &Vocabulary, doc: &LoadedDocument) -> DocumentExtraction {
    let mut failed_pages = 0;
    let mut lines = Vec::new();

    for (idx, page) in doc.pages.iter().enumerate() {
        match page {
            Ok(text) => lines.extend(normalize::normalize_page(text, idx)),
            Err(e) => {
                warn!(document = %doc.name, "{}", e);
                failed_pages += 1;
            }
        }
    }

    let mut extraction =
        extract::extract_document(vocab, &doc.name, doc.identifier.clone(), &lines);
    extraction.failed_pages = failed_pages;
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use std::path::PathBuf;
    use vocab::{KeywordSet, LineWords};

    fn vocab() -> Vocabulary {
        Vocabulary {
            keywords: KeywordSet::new(["Blis", "Vistar"]).unwrap(),
            stop_words: LineWords::new(["Comments", "Response", "Risks"]),
            response_start: LineWords::new(["Response"]),
            answers: Vec::new(),
        }
    }

    #[test]
    fn failed_page_is_skipped() {
        let doc = LoadedDocument {
            name: "Acme_7.txt".into(),
            identifier: Some("7".into()),
            pages: vec![
                Ok("1.1 Who hosts the data?\nResponse\nBlis hosts it.".into()),
                Err(ExtractError::PageExtractionFailed {
                    path: PathBuf::from("Acme_7.txt"),
                    page: 2,
                    reason: "invalid utf-8".into(),
                }),
            ],
        };

        let result = process_document(&vocab(), &doc);
        assert_eq!(result.failed_pages, 1);
        assert_eq!(result.identifier.as_deref(), Some("7"));
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].question, "Who hosts the data?");
        assert_eq!(result.hits[0].response.as_deref(), Some("Blis hosts it."));
    }

    #[test]
    fn fixture_document() {
        let raw = include_str!("../../tests/fixtures/vendor_assessment.txt");
        let pages: Vec<String> = raw.split('\x0C').map(str::to_string).collect();
        let doc = LoadedDocument::from_pages("Vendor Assessment_1042.txt", pages);

        let result = process_document(&vocab(), &doc);
        assert_eq!(result.identifier.as_deref(), Some("1042"));
        assert_eq!(result.failed_pages, 0);
        assert!(result.section("2.1").is_some());
        assert!(result
            .hits
            .iter()
            .any(|h| h.keyword == "Vistar" && h.location.label() == "Cover"));
    }
}
