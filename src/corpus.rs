use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{ExtractError, Result};

// "Acme Vendor_12345" -> 12345
static ID_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_\-\s](\d+)$").unwrap());

const PAGE_BREAK: u8 = 0x0C;

/// Trailing digit run after the last separator of the file stem.
pub fn identifier_from_file_name(name: &str) -> Option<String> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    ID_SUFFIX_RE
        .captures(stem.trim_end())
        .map(|caps| caps[1].to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub path: PathBuf,
    pub name: String,
    pub kind: DocumentKind,
    pub identifier: Option<String>,
}

impl DocumentRef {
    /// None for files the corpus does not read.
    pub fn new(path: PathBuf) -> Option<Self> {
        let kind = DocumentKind::from_path(&path)?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        let identifier = identifier_from_file_name(&name);
        Some(DocumentRef {
            path,
            name,
            kind,
            identifier,
        })
    }
}

/// Documents of a folder, indexed by the identifier in their file name.
#[derive(Debug, Default)]
pub struct Corpus {
    by_id: BTreeMap<String, Vec<DocumentRef>>,
    unmatched: Vec<DocumentRef>,
}

impl Corpus {
    pub fn scan(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ExtractError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("corpus folder not found: {}", dir.display()),
            )));
        }

        let docs: Vec<DocumentRef> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| DocumentRef::new(e.into_path()))
            .collect();

        let corpus = Corpus::from_documents(docs);
        info!(
            documents = corpus.len(),
            identifiers = corpus.by_id.len(),
            unmatched = corpus.unmatched.len(),
            "Indexed corpus {}",
            dir.display()
        );
        Ok(corpus)
    }

    pub fn from_documents(docs: Vec<DocumentRef>) -> Self {
        let mut corpus = Corpus::default();
        for doc in docs {
            match doc.identifier.clone() {
                Some(id) => corpus.by_id.entry(id).or_default().push(doc),
                None => {
                    debug!(document = %doc.name, "No identifier in file name");
                    corpus.unmatched.push(doc);
                }
            }
        }
        for docs in corpus.by_id.values_mut() {
            docs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        }
        corpus.unmatched.sort_by(|a, b| a.path.cmp(&b.path));
        corpus
    }

    pub fn documents_for(&self, identifier: &str) -> &[DocumentRef] {
        self.by_id.get(identifier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Identified documents in identifier order, then the unmatched ones.
    pub fn all_documents(&self) -> impl Iterator<Item = &DocumentRef> {
        self.by_id.values().flatten().chain(self.unmatched.iter())
    }

    pub fn unmatched(&self) -> &[DocumentRef] {
        &self.unmatched
    }

    pub fn len(&self) -> usize {
        self.by_id.values().map(Vec::len).sum::<usize>() + self.unmatched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Page texts of one document. A failed page is kept as an error so the
/// caller can log it and carry on with an empty page.
#[derive(Debug)]
pub struct LoadedDocument {
    pub name: String,
    pub identifier: Option<String>,
    pub pages: Vec<Result<String>>,
}

#[cfg(test)]
impl LoadedDocument {
    pub fn from_pages(name: &str, pages: Vec<String>) -> Self {
        LoadedDocument {
            name: name.to_string(),
            identifier: identifier_from_file_name(name),
            pages: pages.into_iter().map(Ok).collect(),
        }
    }
}

pub fn load_document(doc: &DocumentRef) -> Result<LoadedDocument> {
    let bytes = std::fs::read(&doc.path).map_err(|e| ExtractError::DocumentUnreadable {
        path: doc.path.clone(),
        reason: e.to_string(),
    })?;

    let pages = match doc.kind {
        DocumentKind::Pdf => pdf_pages(&doc.path, &bytes)?,
        DocumentKind::Text => text_pages(&doc.path, &bytes),
    };

    Ok(LoadedDocument {
        name: doc.name.clone(),
        identifier: doc.identifier.clone(),
        pages,
    })
}

// pdf_extract can panic on malformed input rather than returning an error.
fn pdf_pages(path: &Path, bytes: &[u8]) -> Result<Vec<Result<String>>> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages.into_iter().map(Ok).collect()),
        Ok(Err(e)) => Err(ExtractError::DocumentUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        Err(_) => Err(ExtractError::DocumentUnreadable {
            path: path.to_path_buf(),
            reason: "PDF parser panicked (malformed document)".to_string(),
        }),
    }
}

/// Plain-text exports separate pages with form feeds.
fn text_pages(path: &Path, bytes: &[u8]) -> Vec<Result<String>> {
    bytes
        .split(|b| *b == PAGE_BREAK)
        .enumerate()
        .map(|(idx, chunk)| {
            String::from_utf8(chunk.to_vec()).map_err(|e| ExtractError::PageExtractionFailed {
                path: path.to_path_buf(),
                page: idx + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}
