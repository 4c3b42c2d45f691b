use std::collections::HashSet;

use regex::Regex;

use crate::parser::extract::answers::AnswerSpec;

/// Lowercased, whitespace-collapsed form used for every case-insensitive
/// comparison (dedup keys, stop-word equality).
pub fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone)]
struct Keyword {
    name: String,
    re: Regex,
}

/// Ordered keyword vocabulary matched as whole words, case-insensitively.
/// A word boundary is any character that is not a letter or digit, so
/// `Blis_Report` and `(Blis)` both contain `Blis` but `Bliss` does not.
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    pub fn new<I, S>(words: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut keywords = Vec::new();
        for word in words {
            let name = word.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
            if name.is_empty() || !seen.insert(fold(&name)) {
                continue;
            }
            let pattern = format!(
                r"(?i)(?:^|[^\p{{L}}\p{{N}}]){}(?:[^\p{{L}}\p{{N}}]|$)",
                regex::escape(&name)
            );
            keywords.push(Keyword {
                re: Regex::new(&pattern)?,
                name,
            });
        }
        Ok(KeywordSet { keywords })
    }

    /// Configured names of every keyword found in `text`, in vocabulary order.
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.keywords
            .iter()
            .filter(move |k| k.re.is_match(text))
            .map(|k| k.name.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.keywords.iter().position(|k| k.name == name)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }
}

/// Words that only count when they make up the entire line ("Response",
/// "Comments"). `Response to question` is not a match.
#[derive(Debug, Clone, Default)]
pub struct LineWords {
    folded: HashSet<String>,
}

impl LineWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let folded = words
            .into_iter()
            .map(|w| fold(w.as_ref()))
            .filter(|w| !w.is_empty())
            .collect();
        LineWords { folded }
    }

    pub fn matches(&self, line: &str) -> bool {
        !self.folded.is_empty() && self.folded.contains(&fold(line))
    }
}

/// Everything the scanner and its listeners need to know about the
/// configured vocabulary.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub keywords: KeywordSet,
    pub stop_words: LineWords,
    pub response_start: LineWords,
    pub answers: Vec<AnswerSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(words: &[&str]) -> KeywordSet {
        KeywordSet::new(words.iter().copied()).unwrap()
    }

    #[test]
    fn whole_word_only() {
        let set = kws(&["Blis"]);
        assert_eq!(set.matches("We use blis data").count(), 1);
        assert_eq!(set.matches("BLIS.").count(), 1);
        assert_eq!(set.matches("(Blis)").count(), 1);
        assert_eq!(set.matches("Blis_Report_123").count(), 1);
        assert_eq!(set.matches("published").count(), 0);
        assert_eq!(set.matches("Bliss is ignorance").count(), 0);
    }

    #[test]
    fn matches_in_vocabulary_order() {
        let set = kws(&["Vistar", "Blis"]);
        let found: Vec<_> = set.matches("Blis and Vistar").collect();
        assert_eq!(found, vec!["Vistar", "Blis"]);
    }

    #[test]
    fn duplicates_and_blanks_dropped() {
        let set = kws(&["Blis", " ", "blis", "Vistar"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.position("Vistar"), Some(1));
    }

    #[test]
    fn keyword_with_regex_chars() {
        let set = kws(&["C++ Media"]);
        assert_eq!(set.matches("partner: c++ media, inc").count(), 1);
    }

    #[test]
    fn line_words_need_full_line() {
        let words = LineWords::new(["Response", "Comments"]);
        assert!(words.matches("response"));
        assert!(words.matches("  RESPONSE "));
        assert!(!words.matches("Response to question"));
        assert!(!LineWords::default().matches(""));
    }

    #[test]
    fn fold_collapses() {
        assert_eq!(fold("  We   Use\tBlis "), "we use blis");
    }
}
