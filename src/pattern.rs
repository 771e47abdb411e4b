//! File-name patterns for batch conversion.
//!
//! A pattern is one or more comma-separated alternatives; each alternative
//! may use `*` (any run of characters) and `?` (exactly one character).
//! Matching is case-insensitive and applies to the bare file name.

use crate::error::ConvertError;
use regex::Regex;

/// A compiled file-name pattern.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    pub fn parse(pattern: &str) -> Result<Self, ConvertError> {
        let invalid = |reason: String| ConvertError::Validation {
            operation: "batch_convert",
            field: "pattern",
            reason,
        };
        let alternatives: Vec<&str> = pattern
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Err(invalid(format!("'{pattern}' has no alternatives")));
        }

        let mut re = String::from("(?i)^(?:");
        for (i, alt) in alternatives.iter().enumerate() {
            if i > 0 {
                re.push('|');
            }
            let mut literal = [0u8; 4];
            for c in alt.chars() {
                match c {
                    '*' => re.push_str(".*"),
                    '?' => re.push('.'),
                    c => re.push_str(&regex::escape(c.encode_utf8(&mut literal))),
                }
            }
        }
        re.push_str(")$");

        let regex = Regex::new(&re).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for FilePattern {
    /// Matches every file name.
    fn default() -> Self {
        Self {
            source: "*".to_string(),
            regex: Regex::new("(?s)^.*$").unwrap_or_else(|_| unreachable!("constant pattern")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_question_mark() {
        let p = FilePattern::parse("report-??.*").unwrap();
        assert!(p.matches("report-01.pdf"));
        assert!(p.matches("REPORT-AB.MD"));
        assert!(!p.matches("report-1.pdf"));
        assert!(!p.matches("xreport-01.pdf"));
    }

    #[test]
    fn alternatives_are_comma_separated() {
        let p = FilePattern::parse("*.md, *.txt").unwrap();
        assert!(p.matches("a.md"));
        assert!(p.matches("b.TXT"));
        assert!(!p.matches("c.html"));
    }

    #[test]
    fn dots_and_brackets_are_literal() {
        let p = FilePattern::parse("[draft].md").unwrap();
        assert!(p.matches("[draft].md"));
        assert!(!p.matches("d.md"));
        assert!(!p.matches("[draft]xmd"));
    }

    #[test]
    fn empty_pattern_is_invalid() {
        let err = FilePattern::parse(" , ").unwrap_err();
        assert!(matches!(err, ConvertError::Validation { field: "pattern", .. }));
    }

    #[test]
    fn default_matches_everything() {
        let p = FilePattern::default();
        assert!(p.matches("anything.at.all"));
        assert_eq!(p.as_str(), "*");
    }
}
