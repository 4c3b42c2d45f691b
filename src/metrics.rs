use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Counters for one batch run. Summed across identifiers and chunks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTally {
    pub identifiers: usize,
    pub identifiers_without_documents: usize,
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub documents_without_occurrences: usize,
    pub pages_failed: usize,
    pub placeholder_records: usize,
    pub records: usize,
}

impl BatchTally {
    pub fn merge(&mut self, other: &BatchTally) {
        self.identifiers += other.identifiers;
        self.identifiers_without_documents += other.identifiers_without_documents;
        self.documents_processed += other.documents_processed;
        self.documents_skipped += other.documents_skipped;
        self.documents_without_occurrences += other.documents_without_occurrences;
        self.pages_failed += other.pages_failed;
        self.placeholder_records += other.placeholder_records;
        self.records += other.records;
    }

    pub fn print(&self) {
        println!(
            "Identifiers: {} ({} without documents)",
            self.identifiers, self.identifiers_without_documents
        );
        println!(
            "Documents:   {} processed, {} skipped, {} without keyword hits",
            self.documents_processed, self.documents_skipped, self.documents_without_occurrences
        );
        println!("Pages failed: {}", self.pages_failed);
        println!(
            "Saved {} records ({} placeholders).",
            self.records, self.placeholder_records
        );
    }
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f"))
}
