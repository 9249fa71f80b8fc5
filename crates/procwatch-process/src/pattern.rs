//! Patterns accepted by the output waiters

use std::fmt;

use memchr::memmem;
use regex::bytes::Regex;

use crate::error::Result;

/// What a pattern wait looks for in a stream transcript
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact byte-substring match
    Literal(String),
    /// Compiled regular expression
    Regex(Regex),
}

impl Pattern {
    /// Compile a regular expression pattern
    pub fn regex(expr: &str) -> Result<Self> {
        Ok(Pattern::Regex(Regex::new(expr)?))
    }

    /// Find the first match starting at `from`, as a byte range into `haystack`
    pub fn find_at(&self, haystack: &[u8], from: usize) -> Option<(usize, usize)> {
        if from > haystack.len() {
            return None;
        }
        match self {
            Pattern::Literal(text) => {
                let needle = text.as_bytes();
                memmem::find(&haystack[from..], needle)
                    .map(|offset| (from + offset, from + offset + needle.len()))
            }
            Pattern::Regex(re) => re.find_at(haystack, from).map(|m| (m.start(), m.end())),
        }
    }

    /// Where a retry should start after `scanned_to` bytes were searched in vain
    ///
    /// A literal can only straddle the old end by `len - 1` bytes. Regexes may
    /// depend on context and restart from the cursor.
    pub fn resume_from(&self, cursor: usize, scanned_to: usize) -> usize {
        match self {
            Pattern::Literal(text) => {
                let overlap = text.len().saturating_sub(1);
                cursor.max(scanned_to.saturating_sub(overlap))
            }
            Pattern::Regex(_) => cursor,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(text) => write!(f, "{text:?}"),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::Literal(text.to_string())
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Pattern::Literal(text)
    }
}

impl From<&String> for Pattern {
    fn from(text: &String) -> Self {
        Pattern::Literal(text.clone())
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl TryFrom<&regex::Regex> for Pattern {
    type Error = crate::error::ProcessError;

    fn try_from(re: &regex::Regex) -> Result<Self> {
        Pattern::regex(re.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_not_a_regex() {
        let pattern = Pattern::from("a.c");
        assert_eq!(pattern.find_at(b"abc a.c", 0), Some((4, 7)));
    }

    #[test]
    fn test_literal_respects_start_offset() {
        let pattern = Pattern::from("ok");
        assert_eq!(pattern.find_at(b"ok ok", 1), Some((3, 5)));
        assert_eq!(pattern.find_at(b"ok ok", 4), None);
    }

    #[test]
    fn test_empty_literal_matches_at_cursor() {
        let pattern = Pattern::from("");
        assert_eq!(pattern.find_at(b"abc", 2), Some((2, 2)));
    }

    #[test]
    fn test_regex_anchor_sees_whole_transcript() {
        let pattern = Pattern::regex(r"^start").unwrap();
        assert_eq!(pattern.find_at(b"start start", 1), None);

        let pattern = Pattern::regex(r"(?m)^\d+$").unwrap();
        assert_eq!(pattern.find_at(b"x\n42\n", 0), Some((2, 4)));
    }

    #[test]
    fn test_offset_past_end() {
        assert_eq!(Pattern::from("a").find_at(b"a", 5), None);
    }

    #[test]
    fn test_literal_resume_keeps_overlap() {
        let pattern = Pattern::from("abcd");
        assert_eq!(pattern.resume_from(0, 10), 7);
        assert_eq!(pattern.resume_from(9, 10), 9);
        assert_eq!(pattern.resume_from(0, 2), 0);
        assert_eq!(Pattern::from("").resume_from(0, 10), 10);
        assert_eq!(Pattern::regex("x").unwrap().resume_from(3, 10), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(Pattern::from("ready").to_string(), "\"ready\"");
        assert_eq!(Pattern::regex(r"v\d").unwrap().to_string(), r"/v\d/");
    }

    #[test]
    fn test_invalid_regex() {
        assert!(Pattern::regex("(").is_err());
    }

    #[test]
    fn test_from_unicode_regex() {
        let re = regex::Regex::new(r"done \d+").unwrap();
        let pattern = Pattern::try_from(&re).unwrap();
        assert_eq!(pattern.find_at(b"-- done 7", 0), Some((3, 9)));
    }
}
