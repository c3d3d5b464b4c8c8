//! Key name → pattern derivation.
//!
//! The first segment of a key is kept literally; every segment that follows a
//! delimiter collapses into the placeholder. Delimiters stay in place, so
//! `user#1` and `user#1#2` land in different buckets (`user#*`, `user#*#*`).
//!
//! A delimiter immediately preceded by the escape character is a literal
//! character of the current segment and the escape itself is dropped. An
//! escape character not followed by a delimiter (including one at the end of
//! the key) is kept as-is.
//!
//! When the leading segment is written out, literal escape characters and
//! literal occurrences of the placeholder are prefixed with the escape, so a
//! key named `user\#*` (one segment) yields `user#\*` and never shares the
//! `user#*` bucket of two-segment keys.

use crate::error::{Error, Result};

pub const DEFAULT_PLACEHOLDER: &str = "*";
pub const DEFAULT_ESCAPE: char = '\\';

/// Set of single-character split points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterSet {
    chars: Vec<char>,
}

impl DelimiterSet {
    pub fn new<I: IntoIterator<Item = char>>(chars: I) -> Result<Self> {
        let mut chars: Vec<char> = chars.into_iter().collect();
        chars.sort_unstable();
        chars.dedup();
        if chars.is_empty() {
            return Err(Error::invalid_option(
                "delimiters",
                "at least one delimiter is required",
            ));
        }
        Ok(Self { chars })
    }

    /// Parses configuration strings, each of which must be exactly one character.
    pub fn from_strings<S: AsRef<str>>(values: &[S]) -> Result<Self> {
        let mut chars = Vec::with_capacity(values.len());
        for value in values {
            chars.push(single_char("delimiters", value.as_ref())?);
        }
        Self::new(chars)
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}

pub(crate) fn single_char(name: &str, value: &str) -> Result<char> {
    let mut iter = value.chars();
    match (iter.next(), iter.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::invalid_option(
            name,
            format!("'{}' must be exactly one character", value),
        )),
    }
}

#[derive(Debug, Clone)]
pub struct PatternDeriver {
    delimiters: DelimiterSet,
    escape: char,
    placeholder: String,
}

impl PatternDeriver {
    pub fn new(delimiters: DelimiterSet, escape: char) -> Result<Self> {
        Self::with_placeholder(delimiters, escape, DEFAULT_PLACEHOLDER)
    }

    pub fn with_placeholder(
        delimiters: DelimiterSet,
        escape: char,
        placeholder: &str,
    ) -> Result<Self> {
        if delimiters.contains(escape) {
            return Err(Error::invalid_option(
                "escape",
                format!("'{}' is also a delimiter", escape),
            ));
        }
        if placeholder.is_empty() {
            return Err(Error::invalid_option("placeholder", "must not be empty"));
        }
        if placeholder
            .chars()
            .any(|c| c == escape || delimiters.contains(c))
        {
            return Err(Error::invalid_option(
                "placeholder",
                format!("'{}' contains the escape or a delimiter", placeholder),
            ));
        }
        Ok(Self {
            delimiters,
            escape,
            placeholder: placeholder.to_string(),
        })
    }

    pub fn delimiters(&self) -> &DelimiterSet {
        &self.delimiters
    }

    pub fn escape(&self) -> char {
        self.escape
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn derive(&self, key: &str) -> String {
        let mut leading = String::with_capacity(key.len());
        let mut splits: Vec<char> = Vec::new();
        let mut chars = key.chars().peekable();

        while let Some(c) = chars.next() {
            if c == self.escape {
                match chars.peek() {
                    Some(&next) if self.delimiters.contains(next) => {
                        chars.next();
                        if splits.is_empty() {
                            leading.push(next);
                        }
                    }
                    _ => {
                        if splits.is_empty() {
                            leading.push(c);
                        }
                    }
                }
            } else if self.delimiters.contains(c) {
                splits.push(c);
            } else if splits.is_empty() {
                leading.push(c);
            }
        }

        let mut pattern =
            String::with_capacity(leading.len() * 2 + splits.len() * (1 + self.placeholder.len()));
        self.push_literal(&mut pattern, &leading);
        for delimiter in splits {
            pattern.push(delimiter);
            pattern.push_str(&self.placeholder);
        }
        pattern
    }

    /// Writes leading-segment text so it can never be read as a placeholder.
    fn push_literal(&self, out: &mut String, literal: &str) {
        let mut rest = literal;
        while let Some(c) = rest.chars().next() {
            if rest.starts_with(self.placeholder.as_str()) {
                out.push(self.escape);
                out.push_str(&self.placeholder);
                rest = &rest[self.placeholder.len()..];
            } else {
                if c == self.escape {
                    out.push(self.escape);
                }
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
}

/// Convenience wrapper for one-off derivations with the default placeholder.
pub fn derive(key: &str, delimiters: &DelimiterSet, escape: char) -> Result<String> {
    Ok(PatternDeriver::new(delimiters.clone(), escape)?.derive(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deriver(delims: &[char]) -> PatternDeriver {
        PatternDeriver::new(DelimiterSet::new(delims.iter().copied()).unwrap(), '\\').unwrap()
    }

    #[test]
    fn test_collapses_trailing_segments() {
        let d = deriver(&['#', ':']);
        assert_eq!(d.derive("user#1"), "user#*");
        assert_eq!(d.derive("user#2"), "user#*");
        assert_eq!(d.derive("order:5"), "order:*");
        assert_eq!(d.derive("session:abc#9"), "session:*#*");
    }

    #[test]
    fn test_split_arity_never_collides() {
        let d = deriver(&[':']);
        assert_ne!(d.derive("a:b"), d.derive("a:b:c"));
        assert_eq!(d.derive("a:b:c"), "a:*:*");
    }

    #[test]
    fn test_escaped_delimiter_is_literal() {
        let d = deriver(&['#']);
        assert_eq!(d.derive("a\\#b"), "a#b");
    }

    #[test]
    fn test_escaped_and_plain_agree_when_segments_match() {
        let d = deriver(&['#']);
        // Same logical segments: ["user", <one segment>]
        assert_eq!(d.derive("user#a\\#b"), d.derive("user#ab"));
        // Different logical segments: ["a#b"] vs ["a", "b"]
        assert_ne!(d.derive("a\\#b"), d.derive("a#b"));
    }

    #[test]
    fn test_literal_escape_is_doubled_in_pattern() {
        let d = deriver(&['#']);
        assert_eq!(d.derive("a\\b"), "a\\\\b");
        assert_eq!(d.derive("trailing\\"), "trailing\\\\");
        // First escape is literal, the second escapes '#'.
        assert_eq!(d.derive("a\\\\#b"), "a\\\\#b");
    }

    #[test]
    fn test_literal_placeholder_never_matches_collapsed_segment() {
        let d = deriver(&['#']);
        assert_eq!(d.derive("user\\#*"), "user#\\*");
        assert_eq!(d.derive("user#*"), "user#*");
        assert_eq!(d.derive("user#42"), "user#*");
        assert_ne!(d.derive("user\\#*"), d.derive("user#42"));
        assert_eq!(d.derive("*"), "\\*");
    }

    /// Reference segmentation: the leading segment and the delimiters that follow it.
    fn shape(key: &str, delims: &[char]) -> (String, Vec<char>) {
        let chars: Vec<char> = key.chars().collect();
        let mut segments = vec![String::new()];
        let mut splits = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && i + 1 < chars.len() && delims.contains(&chars[i + 1]) {
                segments.last_mut().unwrap().push(chars[i + 1]);
                i += 2;
                continue;
            }
            if delims.contains(&c) {
                splits.push(c);
                segments.push(String::new());
            } else {
                segments.last_mut().unwrap().push(c);
            }
            i += 1;
        }
        (segments.swap_remove(0), splits)
    }

    #[test]
    fn test_same_pattern_iff_same_segment_structure() {
        use std::collections::HashMap;

        let delims = ['#', ':'];
        let d = deriver(&delims);
        let alphabet = ['a', '#', ':', '\\', '*'];

        let mut keys = vec![String::new()];
        let mut frontier = vec![String::new()];
        for _ in 0..5 {
            let mut next = Vec::new();
            for prefix in &frontier {
                for c in alphabet {
                    let mut key = prefix.clone();
                    key.push(c);
                    next.push(key);
                }
            }
            keys.extend(next.iter().cloned());
            frontier = next;
        }

        let mut by_pattern: HashMap<String, ((String, Vec<char>), String)> = HashMap::new();
        let mut by_shape: HashMap<(String, Vec<char>), (String, String)> = HashMap::new();
        for key in &keys {
            let pattern = d.derive(key);
            let key_shape = shape(key, &delims);

            if let Some((seen_shape, other)) = by_pattern.get(&pattern) {
                assert_eq!(
                    seen_shape, &key_shape,
                    "'{}' and '{}' share pattern '{}' but differ in structure",
                    other, key, pattern
                );
            } else {
                by_pattern.insert(pattern.clone(), (key_shape.clone(), key.clone()));
            }

            if let Some((seen_pattern, other)) = by_shape.get(&key_shape) {
                assert_eq!(
                    seen_pattern, &pattern,
                    "'{}' and '{}' share structure but got different patterns",
                    other, key
                );
            } else {
                by_shape.insert(key_shape, (pattern, key.clone()));
            }
        }
        assert!(by_pattern.len() > 100);
    }

    #[test]
    fn test_degenerate_inputs() {
        let d = deriver(&[':']);
        assert_eq!(d.derive(""), "");
        assert_eq!(d.derive("plain"), "plain");
        assert_eq!(d.derive(":lead"), ":*");
        assert_eq!(d.derive("tail:"), "tail:*");
        assert_eq!(d.derive(":::"), ":*:*:*");
    }

    #[test]
    fn test_dense_delimiters_stay_bounded() {
        let d = deriver(&[':']);
        let key = ":".repeat(10_000);
        let pattern = d.derive(&key);
        assert_eq!(pattern.len(), key.len() * 2);
    }

    #[test]
    fn test_custom_placeholder() {
        let set = DelimiterSet::new([':']).unwrap();
        let d = PatternDeriver::with_placeholder(set, '\\', "<seg>").unwrap();
        assert_eq!(d.derive("order:5"), "order:<seg>");
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(DelimiterSet::new(Vec::<char>::new()).is_err());
        assert!(DelimiterSet::from_strings(&["::"]).is_err());
        assert!(DelimiterSet::from_strings(&[""]).is_err());

        let set = DelimiterSet::from_strings(&["#", "\\"]).unwrap();
        assert!(PatternDeriver::new(set.clone(), '\\').is_err());
        assert!(PatternDeriver::with_placeholder(DelimiterSet::new(['#']).unwrap(), '\\', "").is_err());
        assert!(PatternDeriver::with_placeholder(DelimiterSet::new(['#']).unwrap(), '\\', "#").is_err());
        assert!(PatternDeriver::with_placeholder(DelimiterSet::new(['#']).unwrap(), '\\', "\\x").is_err());
    }

    #[test]
    fn test_free_function() {
        let set = DelimiterSet::from_strings(&["#"]).unwrap();
        assert_eq!(derive("user#42", &set, '\\').unwrap(), "user#*");
    }
}
