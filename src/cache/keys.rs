//! Cache key helpers.
//!
//! Key validation, the reserved tag-version namespace, versioned key
//! composition and glob patterns used by bulk invalidation.

use std::collections::BTreeSet;

use regex::Regex;

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

/// Prefix of the keys holding tag version counters
pub const TAG_NAMESPACE: &str = "tags:";

const TAG_SEPARATOR: char = ',';

// == Validation ==
/// Accepts 1..=250 characters from `[A-Za-z0-9:_-]`, outside the tag namespace.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        )));
    }
    if let Some(c) = key.chars().find(|c| !is_key_char(*c)) {
        return Err(CacheError::InvalidKey(format!(
            "key contains forbidden character {:?}",
            c
        )));
    }
    if is_tag_version_key(key) {
        return Err(CacheError::InvalidKey(format!(
            "keys starting with '{}' are reserved",
            TAG_NAMESPACE
        )));
    }
    Ok(())
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-')
}

pub fn is_tag_version_key(key: &str) -> bool {
    key.starts_with(TAG_NAMESPACE)
}

// == Tags ==
/// Builds the deterministic registry key for a tag set: duplicates removed,
/// tags sorted and joined.
pub fn tag_set_key<I, S>(tags: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref();
        if tag.is_empty() {
            return Err(CacheError::InvalidTags("tag cannot be empty".to_string()));
        }
        if tag.contains(TAG_SEPARATOR) {
            return Err(CacheError::InvalidTags(format!(
                "tag {:?} contains '{}'",
                tag, TAG_SEPARATOR
            )));
        }
        set.insert(tag.to_string());
    }

    if set.is_empty() {
        return Err(CacheError::InvalidTags(
            "at least one tag is required".to_string(),
        ));
    }

    let joined: Vec<String> = set.into_iter().collect();
    Ok(format!("{}{}", TAG_NAMESPACE, joined.join(",")))
}

// == Versioned Keys ==
/// Composes the physical key for `base` under a tag-set version. The only
/// place that knows the suffix format.
///
/// The composed key obeys the same length bound as any other key, so every
/// stored tagged entry stays addressable through `get` and `delete`.
pub fn versioned_key(base: &str, version: u64) -> Result<String> {
    let key = format!("{}:v{}", base, version);
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "versioned key {:?} exceeds maximum length of {} characters",
            key, MAX_KEY_LENGTH
        )));
    }
    Ok(key)
}

// == Glob Patterns ==
/// Compiled `*` glob matched against whole keys.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern(
                "pattern cannot be empty".to_string(),
            ));
        }

        let body: Vec<String> = pattern.split('*').map(regex::escape).collect();
        let regex = Regex::new(&format!("^{}$", body.join(".*")))
            .map_err(|e| CacheError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_safe_charset() {
        assert!(validate_key("product:123").is_ok());
        assert!(validate_key("search_results-page:2").is_ok());
        assert!(validate_key(&"x".repeat(MAX_KEY_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_key_rejects_bad_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key(&"x".repeat(MAX_KEY_LENGTH + 1)).is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("product/1").is_err());
        assert!(validate_key("product*").is_err());
        assert!(validate_key("tags:featured").is_err());
    }

    #[test]
    fn test_tag_set_key_is_order_independent() {
        let a = tag_set_key(["products", "featured"]).unwrap();
        let b = tag_set_key(vec!["featured".to_string(), "products".to_string()]).unwrap();
        let c = tag_set_key(["featured", "products", "featured"]).unwrap();

        assert_eq!(a, "tags:featured,products");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(is_tag_version_key(&a));
    }

    #[test]
    fn test_tag_set_key_rejects_empty_and_malformed() {
        let empty: [&str; 0] = [];
        assert!(matches!(tag_set_key(empty), Err(CacheError::InvalidTags(_))));
        assert!(matches!(tag_set_key([""]), Err(CacheError::InvalidTags(_))));
        assert!(matches!(tag_set_key(["a,b"]), Err(CacheError::InvalidTags(_))));
    }

    #[test]
    fn test_versioned_key() {
        assert_eq!(versioned_key("featured", 0).unwrap(), "featured:v0");
        assert_eq!(versioned_key("category:7", 12).unwrap(), "category:7:v12");
    }

    #[test]
    fn test_versioned_key_respects_length_bound() {
        let fits = "k".repeat(MAX_KEY_LENGTH - 3);
        assert_eq!(versioned_key(&fits, 0).unwrap().len(), MAX_KEY_LENGTH);

        let base = "k".repeat(MAX_KEY_LENGTH);
        assert!(validate_key(&base).is_ok());
        assert!(matches!(
            versioned_key(&base, 0),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            versioned_key(&fits, 10),
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = KeyPattern::compile("product:*").unwrap();

        assert!(pattern.matches("product:1"));
        assert!(pattern.matches("product:"));
        assert!(pattern.matches("product:1:reviews"));
        assert!(!pattern.matches("products:1"));
        assert!(!pattern.matches("featured:product:1"));
        assert_eq!(pattern.as_str(), "product:*");
    }

    #[test]
    fn test_pattern_inner_wildcard_and_literal() {
        let inner = KeyPattern::compile("category:*:page-1").unwrap();
        assert!(inner.matches("category:shoes:page-1"));
        assert!(!inner.matches("category:shoes:page-10"));

        let literal = KeyPattern::compile("stats").unwrap();
        assert!(literal.matches("stats"));
        assert!(!literal.matches("stats:daily"));

        let all = KeyPattern::compile("*").unwrap();
        assert!(all.matches("anything"));
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let pattern = KeyPattern::compile("a.b*").unwrap();
        assert!(pattern.matches("a.bc"));
        assert!(!pattern.matches("axbc"));
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        assert!(matches!(
            KeyPattern::compile(""),
            Err(CacheError::InvalidPattern(_))
        ));
    }
}
