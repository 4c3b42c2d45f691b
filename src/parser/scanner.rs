use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use super::normalize::Line;
use super::vocab::LineWords;

// Optional label ("Section", "Sec.", "Q"), then X.Y with X in 1..=99 and Y in 0..=99.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?i:(?:section|sec|question|q|item|part)\.?\s*)?(?P<major>[1-9]\d?)\.(?P<minor>\d{1,2})(?P<tail>.*)$",
    )
    .unwrap()
});

const HEADER_PUNCT: &[char] = &[')', '.', ':', '-', ',', ';'];

/// Raw `"major.minor"` key of a section, unique within one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SectionKey(String);

impl SectionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub major: u8,
    pub minor: u8,
    pub key: SectionKey,
    /// Same-line text after the number, usually the question.
    pub trailing: String,
}

/// Recognize a numbered section header at the start of a line.
///
/// `3.2 Whose data?`, `Section 3.2: Whose data?` and a bare `3.2` are headers.
/// `3.123`, `3.2.1`, `12.05.2023` and `3.2abc` are not.
pub fn parse_header(line: &str) -> Option<SectionHeader> {
    let caps = HEADER_RE.captures(line)?;
    let major_raw = caps.name("major")?.as_str();
    let minor_raw = caps.name("minor")?.as_str();
    let tail = caps.name("tail").map_or("", |m| m.as_str());

    let mut chars = tail.chars();
    match chars.next() {
        None => {}
        Some(c) if c.is_alphanumeric() => return None,
        Some('.') | Some(',') if chars.next().is_some_and(|n| n.is_ascii_digit()) => return None,
        Some(_) => {}
    }

    let trimmed = tail.trim_start();
    let trailing = trimmed
        .strip_prefix(HEADER_PUNCT)
        .unwrap_or(trimmed)
        .trim()
        .to_string();

    Some(SectionHeader {
        major: major_raw.parse().ok()?,
        minor: minor_raw.parse().ok()?,
        key: SectionKey(format!("{}.{}", major_raw, minor_raw)),
        trailing,
    })
}

/// Where a line sits in its document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Cover,
    Filename,
    Section(SectionKey),
}

impl Location {
    pub fn label(&self) -> &str {
        match self {
            Location::Cover => "Cover",
            Location::Filename => "Filename",
            Location::Section(key) => key.as_str(),
        }
    }

    pub fn section(&self) -> Option<&SectionKey> {
        match self {
            Location::Section(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Progress through the current section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPhase {
    /// Header had no trailing text; the next non-stop line is the question.
    AwaitingQuestion,
    /// Lines are question text until a stop line.
    Question,
    /// Past the question: stop line seen.
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Cover,
    InSection { key: SectionKey, phase: SectionPhase },
}

impl ScanState {
    pub fn location(&self) -> Location {
        match self {
            ScanState::Cover => Location::Cover,
            ScanState::InSection { key, .. } => Location::Section(key.clone()),
        }
    }

    pub fn key(&self) -> Option<&SectionKey> {
        match self {
            ScanState::Cover => None,
            ScanState::InSection { key, .. } => Some(key),
        }
    }

    pub fn phase(&self) -> Option<SectionPhase> {
        match self {
            ScanState::Cover => None,
            ScanState::InSection { phase, .. } => Some(*phase),
        }
    }
}

/// Observer driven by a [`Scanner`] pass. Every listener sees every line;
/// each decides for itself whether it is capturing.
pub trait LineListener {
    /// `closed` is the section being finalized (None when leaving the cover).
    fn on_section_boundary(&mut self, closed: Option<&SectionKey>, opened: &SectionKey);
    fn on_line(&mut self, line: &Line, state: &ScanState);
    /// End of document. `open` is the section still open, if any.
    fn finalize(&mut self, open: Option<&SectionKey>);
}

/// Single forward pass over a document's lines.
pub struct Scanner<'a> {
    stop_words: &'a LineWords,
    state: ScanState,
}

impl<'a> Scanner<'a> {
    pub fn new(stop_words: &'a LineWords) -> Self {
        Scanner {
            stop_words,
            state: ScanState::Cover,
        }
    }

    pub fn feed(&mut self, line: &Line, listeners: &mut [&mut dyn LineListener]) {
        if let Some(header) = parse_header(&line.text) {
            self.open_section(line, header, listeners);
            return;
        }

        if let ScanState::InSection { phase, .. } = &mut self.state {
            let is_stop = self.stop_words.matches(&line.text);
            *phase = match (*phase, is_stop) {
                (_, true) => SectionPhase::Body,
                (SectionPhase::AwaitingQuestion, false) => SectionPhase::Question,
                (SectionPhase::Question, false) => SectionPhase::Question,
                (SectionPhase::Body, false) => SectionPhase::Body,
            };
        }

        for l in listeners.iter_mut() {
            l.on_line(line, &self.state);
        }
    }

    pub fn finish(self, listeners: &mut [&mut dyn LineListener]) {
        let open = self.state.key();
        for l in listeners.iter_mut() {
            l.finalize(open);
        }
    }

    /// Drive `listeners` over all of `lines` and finalize.
    pub fn run(stop_words: &'a LineWords, lines: &[Line], listeners: &mut [&mut dyn LineListener]) {
        let mut scanner = Scanner::new(stop_words);
        for line in lines {
            scanner.feed(line, listeners);
        }
        scanner.finish(listeners);
    }

    fn open_section(
        &mut self,
        line: &Line,
        header: SectionHeader,
        listeners: &mut [&mut dyn LineListener],
    ) {
        for l in listeners.iter_mut() {
            l.on_section_boundary(self.state.key(), &header.key);
        }

        if header.trailing.is_empty() {
            self.state = ScanState::InSection {
                key: header.key,
                phase: SectionPhase::AwaitingQuestion,
            };
            return;
        }

        self.state = ScanState::InSection {
            key: header.key,
            phase: SectionPhase::Question,
        };
        let trailing = Line {
            text: header.trailing,
            page: line.page,
            index: line.index,
            paragraph_break: false,
        };
        for l in listeners.iter_mut() {
            l.on_line(&trailing, &self.state);
        }
    }
}
