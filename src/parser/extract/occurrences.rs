use serde::Serialize;

use crate::parser::normalize::Line;
use crate::parser::scanner::{LineListener, Location, ScanState, SectionKey};
use crate::parser::vocab::KeywordSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Occurrence {
    pub keyword: String,
    pub location: Location,
    pub source: String,
}

/// Emits one occurrence per (keyword, line) hit, tagged with the scanner's
/// location at that line.
pub struct OccurrenceDetector<'a> {
    keywords: &'a KeywordSet,
    source: &'a str,
    hits: Vec<Occurrence>,
}

impl<'a> OccurrenceDetector<'a> {
    pub fn new(keywords: &'a KeywordSet, source: &'a str) -> Self {
        OccurrenceDetector {
            keywords,
            source,
            hits: Vec::new(),
        }
    }

    pub fn into_occurrences(self) -> Vec<Occurrence> {
        self.hits
    }
}

impl LineListener for OccurrenceDetector<'_> {
    fn on_section_boundary(&mut self, _closed: Option<&SectionKey>, _opened: &SectionKey) {}

    fn on_line(&mut self, line: &Line, state: &ScanState) {
        for keyword in self.keywords.matches(&line.text) {
            self.hits.push(Occurrence {
                keyword: keyword.to_string(),
                location: state.location(),
                source: self.source.to_string(),
            });
        }
    }

    fn finalize(&mut self, _open: Option<&SectionKey>) {}
}

/// Keywords named in the document's file name (extension excluded).
pub fn detect_in_file_name(keywords: &KeywordSet, file_name: &str) -> Vec<Occurrence> {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    keywords
        .matches(stem)
        .map(|keyword| Occurrence {
            keyword: keyword.to_string(),
            location: Location::Filename,
            source: file_name.to_string(),
        })
        .collect()
}
