use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::corpus::{load_document, Corpus, DocumentRef};
use crate::error::{ExtractError, Result};
use crate::metrics::BatchTally;
use crate::parser::extract::answers::{merge_answers, FieldAnswer};
use crate::parser::extract::{question_rows, DocumentExtraction, QuestionRow};
use crate::parser::process_document;
use crate::parser::vocab::Vocabulary;
use crate::store::MasterRow;

pub const PLACEHOLDER_KEYWORD: &str = "Other";
pub const PLACEHOLDER_LOCATION: &str = "Not Applicable";

/// One output row: master metadata joined with one keyword occurrence.
/// `answers` are per identifier and repeat on each of its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub identifier: String,
    pub metadata: Map<String, Value>,
    pub keyword: String,
    pub location: String,
    pub question: Option<String>,
    pub response: Option<String>,
    pub source_document: String,
    #[serde(default)]
    pub answers: Vec<FieldAnswer>,
}

impl CorpusRecord {
    pub fn is_placeholder(&self) -> bool {
        self.keyword == PLACEHOLDER_KEYWORD && self.location == PLACEHOLDER_LOCATION
    }
}

/// What became of one document of an identifier.
#[derive(Debug)]
pub enum DocumentOutcome {
    Hits(DocumentExtraction),
    /// Parsed fully, zero keyword occurrences.
    NoOccurrence(DocumentExtraction),
    Unreadable,
}

impl DocumentOutcome {
    pub fn from_extraction(extraction: DocumentExtraction) -> Self {
        if extraction.has_occurrences() {
            DocumentOutcome::Hits(extraction)
        } else {
            DocumentOutcome::NoOccurrence(extraction)
        }
    }

    fn extraction(&self) -> Option<&DocumentExtraction> {
        match self {
            DocumentOutcome::Hits(e) | DocumentOutcome::NoOccurrence(e) => Some(e),
            DocumentOutcome::Unreadable => None,
        }
    }
}

/// Everything a scan produced for one identifier. An identifier without
/// documents still gets a result with no records, so stored rows from an
/// earlier scan are cleared.
#[derive(Debug)]
pub struct IdentifierResult {
    pub identifier: String,
    pub records: Vec<CorpusRecord>,
    pub answers: Vec<FieldAnswer>,
    pub tally: BatchTally,
}

impl IdentifierResult {
    fn without_documents(identifier: String) -> Self {
        IdentifierResult {
            identifier,
            records: Vec::new(),
            answers: Vec::new(),
            tally: BatchTally {
                identifiers: 1,
                identifiers_without_documents: 1,
                ..Default::default()
            },
        }
    }
}

/// Configured answers merged over the readable documents, in document order.
pub fn answers_for(outcomes: &[DocumentOutcome]) -> Vec<FieldAnswer> {
    merge_answers(
        outcomes
            .iter()
            .filter_map(DocumentOutcome::extraction)
            .map(|doc| doc.answers.as_slice()),
    )
}

/// Records for one identifier in document order. With no occurrence across
/// all readable documents a single placeholder pointing at the first of them
/// is emitted; with no readable document nothing is.
pub fn records_for(row: &MasterRow, outcomes: &[DocumentOutcome]) -> Vec<CorpusRecord> {
    let answers = answers_for(outcomes);
    let records: Vec<CorpusRecord> = outcomes
        .iter()
        .filter_map(DocumentOutcome::extraction)
        .flat_map(|doc| doc.hits.iter())
        .map(|hit| CorpusRecord {
            identifier: row.identifier.clone(),
            metadata: row.metadata.clone(),
            keyword: hit.keyword.clone(),
            location: hit.location.label().to_string(),
            question: Some(hit.question.clone()).filter(|q| !q.is_empty()),
            response: hit.response.clone(),
            source_document: hit.source.clone(),
            answers: answers.clone(),
        })
        .collect();

    if !records.is_empty() {
        return records;
    }

    outcomes
        .iter()
        .find_map(DocumentOutcome::extraction)
        .map(|first| CorpusRecord {
            identifier: row.identifier.clone(),
            metadata: row.metadata.clone(),
            keyword: PLACEHOLDER_KEYWORD.to_string(),
            location: PLACEHOLDER_LOCATION.to_string(),
            question: None,
            response: None,
            source_document: first.source.clone(),
            answers: answers.clone(),
        })
        .into_iter()
        .collect()
}

pub fn aggregate_identifier(
    vocab: &Vocabulary,
    row: &MasterRow,
    docs: &[DocumentRef],
) -> Result<IdentifierResult> {
    if docs.is_empty() {
        return Err(ExtractError::NoDocumentForIdentifier(row.identifier.clone()));
    }

    let mut tally = BatchTally {
        identifiers: 1,
        ..Default::default()
    };

    let outcomes: Vec<DocumentOutcome> = docs
        .iter()
        .map(|doc| match load_document(doc) {
            Ok(loaded) => {
                let extraction = process_document(vocab, &loaded);
                tally.documents_processed += 1;
                tally.pages_failed += extraction.failed_pages;
                let outcome = DocumentOutcome::from_extraction(extraction);
                if matches!(outcome, DocumentOutcome::NoOccurrence(_)) {
                    tally.documents_without_occurrences += 1;
                }
                outcome
            }
            Err(e) => {
                warn!(identifier = %row.identifier, document = %doc.name, "{}", e);
                tally.documents_skipped += 1;
                DocumentOutcome::Unreadable
            }
        })
        .collect();

    let records = records_for(row, &outcomes);
    tally.records = records.len();
    tally.placeholder_records = records.iter().filter(|r| r.is_placeholder()).count();

    Ok(IdentifierResult {
        identifier: row.identifier.clone(),
        records,
        answers: answers_for(&outcomes),
        tally,
    })
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Run every master row through [`aggregate_identifier`], `batch_size` rows
/// at a time in parallel. Each chunk's results reach `on_chunk` in master
/// order.
pub fn aggregate_corpus<F>(
    vocab: &Vocabulary,
    rows: &[MasterRow],
    corpus: &Corpus,
    batch_size: usize,
    mut on_chunk: F,
) -> anyhow::Result<BatchTally>
where
    F: FnMut(&[IdentifierResult]) -> anyhow::Result<()>,
{
    let pb = progress_bar(rows.len());
    let mut tally = BatchTally::default();

    for chunk in rows.chunks(batch_size.max(1)) {
        let results: Vec<Result<IdentifierResult>> = chunk
            .par_iter()
            .map(|row| aggregate_identifier(vocab, row, corpus.documents_for(&row.identifier)))
            .collect();

        let mut done = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(r) => {
                    tally.merge(&r.tally);
                    done.push(r);
                }
                Err(ExtractError::NoDocumentForIdentifier(id)) => {
                    debug!(identifier = %id, "No document for identifier");
                    let empty = IdentifierResult::without_documents(id);
                    tally.merge(&empty.tally);
                    done.push(empty);
                }
                Err(e) => return Err(e.into()),
            }
        }

        on_chunk(&done)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(tally)
}

/// Cleaned section questions of every document in the corpus, in corpus
/// order. Unreadable documents are skipped.
pub fn collect_questions(
    vocab: &Vocabulary,
    corpus: &Corpus,
    batch_size: usize,
) -> (Vec<QuestionRow>, BatchTally) {
    let docs: Vec<&DocumentRef> = corpus.all_documents().collect();
    let pb = progress_bar(docs.len());
    let mut rows = Vec::new();
    let mut tally = BatchTally::default();

    for chunk in docs.chunks(batch_size.max(1)) {
        let results: Vec<Result<DocumentExtraction>> = chunk
            .par_iter()
            .map(|doc| load_document(doc).map(|loaded| process_document(vocab, &loaded)))
            .collect();

        for (doc, result) in chunk.iter().zip(results) {
            match result {
                Ok(extraction) => {
                    tally.documents_processed += 1;
                    tally.pages_failed += extraction.failed_pages;
                    rows.extend(question_rows(&extraction));
                }
                Err(e) => {
                    warn!(document = %doc.name, "{}", e);
                    tally.documents_skipped += 1;
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    tally.records = rows.len();
    (rows, tally)
}
