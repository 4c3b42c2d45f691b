use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HYPHEN_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w)-[ \t]*\n[ \t]*(\w)").unwrap());
static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\d+|page\s*\d+|(?:page\s*)?\d+\s*(?:of|/)\s*\d+|-\s*\d+\s*-)$").unwrap()
});

const SEPARATOR_CHARS: &[char] = &['-', '/', '_', '.', '|', '~', '*'];

/// One cleaned, non-empty line of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub text: String,
    /// Zero-based page index.
    pub page: usize,
    /// Order of the line among the kept lines of its page.
    pub index: usize,
    /// A blank or graphics-only line was dropped right before this one.
    pub paragraph_break: bool,
}

/// Clean the raw text of one page into lines.
pub fn normalize_page(raw: &str, page: usize) -> Vec<Line> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let text = replace_artifacts(raw).replace("\r\n", "\n").replace('\r', "\n");
    let text = HYPHEN_BREAK_RE.replace_all(&text, "${1}${2}");

    let mut lines = Vec::new();
    let mut pending_break = false;
    for raw_line in text.split('\n') {
        let line = raw_line.split_whitespace().collect::<Vec<_>>().join(" ");

        if line.is_empty() || is_separator_line(&line) {
            pending_break = true;
            continue;
        }
        if is_page_marker(&line) {
            continue;
        }

        lines.push(Line {
            text: line,
            page,
            index: lines.len(),
            paragraph_break: pending_break,
        });
        pending_break = false;
    }

    lines
}

/// Normalize every page in order and concatenate the result.
#[cfg(test)]
pub fn normalize_pages<'a, I>(pages: I) -> Vec<Line>
where
    I: IntoIterator<Item = &'a str>,
{
    pages
        .into_iter()
        .enumerate()
        .flat_map(|(idx, raw)| normalize_page(raw, idx))
        .collect()
}

/// "12", "Page 3", "3 of 10", "Page 3/10", "- 3 -".
pub fn is_page_marker(line: &str) -> bool {
    PAGE_MARKER_RE.is_match(line.trim())
}

/// Short layout rules such as "--", "***" or "|".
pub fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= 3
        && trimmed
            .chars()
            .all(|c| c.is_whitespace() || SEPARATOR_CHARS.contains(&c))
}

fn replace_artifacts(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2013}', '\u{2014}'], "-")
        .replace('\u{00A0}', " ")
        .replace('\u{00AD}', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[Line]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn empty_page() {
        assert!(normalize_page("", 0).is_empty());
        assert!(normalize_page("  \n\t\n", 3).is_empty());
    }

    #[test]
    fn collapses_and_trims() {
        let lines = normalize_page("   We   use\t\tBlis   data.  \n", 0);
        assert_eq!(texts(&lines), vec!["We use Blis data."]);
    }

    #[test]
    fn dehyphenates_across_break() {
        let lines = normalize_page("the adver-\ntising partner\nstays well-known", 0);
        assert_eq!(texts(&lines), vec!["the advertising partner", "stays well-known"]);
    }

    #[test]
    fn drops_page_markers() {
        let raw = "Intro\n12\nPage 3\n3 of 10\nPage 4/10\n4 / 10\n- 5 -\nOutro";
        let lines = normalize_page(raw, 0);
        assert_eq!(texts(&lines), vec!["Intro", "Outro"]);
        assert!(!lines[1].paragraph_break);
    }

    #[test]
    fn separators_mark_paragraph_breaks() {
        let lines = normalize_page("one\n---\ntwo\n\nthree\nfour", 0);
        assert_eq!(texts(&lines), vec!["one", "two", "three", "four"]);
        let breaks: Vec<bool> = lines.iter().map(|l| l.paragraph_break).collect();
        assert_eq!(breaks, vec![false, true, true, false]);
    }

    #[test]
    fn header_numbers_are_not_page_markers() {
        assert!(!is_page_marker("3.2"));
        assert!(!is_page_marker("3.2 Whose data is involved?"));
        assert!(is_page_marker("page 7"));
        assert!(is_page_marker("- 3 -"));
    }

    #[test]
    fn long_rules_are_content() {
        assert!(is_separator_line("_._"));
        assert!(!is_separator_line("-----"));
        assert!(!is_separator_line("a."));
    }

    #[test]
    fn replaces_pdf_artifacts() {
        let lines = normalize_page("con\u{FB01}gured \u{201C}Blis\u{201D}\u{00A0}data", 0);
        assert_eq!(texts(&lines), vec!["configured \"Blis\" data"]);
    }

    #[test]
    fn en_dash_page_marker() {
        assert!(normalize_page("\u{2013} 3 \u{2013}", 0).is_empty());
    }

    #[test]
    fn pages_keep_their_index() {
        let lines = normalize_pages(["a\nb", "", "c"]);
        assert_eq!(lines[2].page, 2);
        assert_eq!(lines[2].index, 0);
        assert_eq!(lines[1].index, 1);
    }
}
