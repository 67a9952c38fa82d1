//! Input sanitizing and blocked-pattern detection.

use crate::models::{CodegenieError, Result, truncate_chars};
use regex::{Regex, RegexBuilder};

/// Characters stripped from free-text input.
const STRIPPED_CHARS: &[char] = &[';', '\\', '<', '>', '/', '&', '|', '$', '`'];

/// Replacement for masked patterns.
pub const BLOCKED_MARKER: &str = "[BLOCKED]";

/// Compiled blocked patterns.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    patterns: Vec<Regex>,
}

impl Sanitizer {
    /// Compile the patterns case-insensitively.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        CodegenieError::InvalidInput(format!("blocked pattern '{p}': {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Clean free-text input.
    ///
    /// Empty input or input longer than `max_length` characters yields an
    /// empty string; callers treat that as "no valid input".
    pub fn sanitize(&self, text: &str, max_length: usize) -> String {
        if text.is_empty() || text.chars().count() > max_length {
            return String::new();
        }

        let mut sanitized: String = text.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
        for pattern in &self.patterns {
            if pattern.is_match(&sanitized) {
                sanitized = pattern.replace_all(&sanitized, BLOCKED_MARKER).into_owned();
            }
        }

        truncate_chars(&sanitized, max_length)
    }

    /// The first blocked pattern found in `code`, if any.
    pub fn find_blocked(&self, code: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(code))
            .map(|p| p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_blocked_patterns;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(&default_blocked_patterns()).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let s = sanitizer();
        assert_eq!(s.sanitize("", 10), "");
        assert_eq!(s.sanitize("eleven char", 10), "");
        assert_eq!(s.sanitize("ten chars!", 10), "ten chars!");
    }

    #[test]
    fn test_strips_shell_characters() {
        let s = sanitizer();
        assert_eq!(s.sanitize("a;b\\c<d>e/f&g|h$i`j", 100), "abcdefghij");
    }

    #[test]
    fn test_masks_blocked_patterns_case_insensitively() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("please IMPORT os and eval(x)", 100),
            "please [BLOCKED] and [BLOCKED]x)"
        );
        assert_eq!(s.sanitize("explain rm -rf", 100), "explain [BLOCKED]-rf");
    }

    #[test]
    fn test_masking_can_extend_then_truncate() {
        let s = sanitizer();
        // "del x" (5 chars) becomes "[BLOCKED]x" (10 chars), then truncated to 5
        assert_eq!(s.sanitize("del x", 5), "[BLOC");
    }

    #[test]
    fn test_find_blocked() {
        let s = sanitizer();
        assert_eq!(s.find_blocked("print('hi')"), None);
        assert_eq!(
            s.find_blocked("import subprocess"),
            Some(r"import\s+(os|sys|shutil|subprocess|socket)")
        );
        assert_eq!(s.find_blocked("x = __import__('os')"), Some("__import__"));
        assert_eq!(s.find_blocked("f = OPEN('x')"), Some(r"open\("));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(Sanitizer::new(&["(".to_string()]).is_err());
    }
}
