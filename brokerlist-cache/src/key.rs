//! Composite cache keys.
//!
//! A cache entry is addressed by a base key plus an optional set of tags.
//! The encoded form is `base|tag:a|tag:b` with tags sorted and deduplicated,
//! so the same (base, tags) pair always lands on the same entry no matter
//! which order the caller listed the tags in.
//!
//! `%` and `|` inside the base or a tag are percent-escaped, which keeps the
//! encoding injective: two different (base, tags) pairs can never produce the
//! same string, and a tag named `brokers` never matches `brokers-eu`.

use std::fmt;

/// Separator between the base key and each tag segment.
const SEGMENT_SEPARATOR: char = '|';

/// Prefix carried by every tag segment.
const TAG_PREFIX: &str = "tag:";

/// A cache key: base key plus normalized tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    encoded: String,
    base: String,
    tags: Vec<String>,
}

impl CacheKey {
    /// Build a key from a base and any number of tags. Empty tags are dropped.
    pub fn new<I, S>(base: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let base = base.into();
        let mut tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();

        let mut encoded = escape(&base);
        for tag in &tags {
            encoded.push_str(&tag_segment(tag));
        }

        Self {
            encoded,
            base,
            tags,
        }
    }

    /// Key with no tags.
    pub fn untagged(base: impl Into<String>) -> Self {
        Self::new(base, std::iter::empty::<&str>())
    }

    /// Decode an encoded key. Returns `None` when a segment after the base
    /// is not a tag segment or an escape sequence is malformed.
    pub fn decode(encoded: &str) -> Option<Self> {
        let mut segments = encoded.split(SEGMENT_SEPARATOR);
        let base = unescape(segments.next()?)?;
        let mut tags = Vec::new();
        for segment in segments {
            let tag = segment.strip_prefix(TAG_PREFIX)?;
            tags.push(unescape(tag)?);
        }
        Some(Self::new(base, tags))
    }

    /// Interpret a caller supplied key string.
    ///
    /// Well-formed encoded keys decode to their (base, tags) pair; anything
    /// else is taken literally as an untagged base key.
    pub fn parse_lenient(raw: &str) -> Self {
        Self::decode(raw).unwrap_or_else(|| Self::untagged(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    /// Prefix shared by every tagged variant of this key's base.
    pub fn variant_prefix(&self) -> String {
        let mut prefix = escape(&self.base);
        prefix.push(SEGMENT_SEPARATOR);
        prefix
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

fn tag_segment(tag: &str) -> String {
    format!("{SEGMENT_SEPARATOR}{TAG_PREFIX}{}", escape(tag))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "7C" => out.push('|'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_untagged_key_is_base() {
        let key = CacheKey::untagged("brokers:all");
        assert_eq!(key.as_str(), "brokers:all");
        assert!(!key.has_tags());
    }

    #[test]
    fn test_tag_order_is_irrelevant() {
        let a = CacheKey::new("rankings:all", ["rankings", "brokers"]);
        let b = CacheKey::new("rankings:all", ["brokers", "rankings", "brokers"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "rankings:all|tag:brokers|tag:rankings");
    }

    #[test]
    fn test_empty_tags_dropped() {
        let key = CacheKey::new("brokers:all", ["", "brokers"]);
        assert_eq!(key.tags(), &["brokers".to_string()]);
    }

    #[test]
    fn test_separator_is_escaped() {
        let key = CacheKey::new("a|tag:b", ["c%d"]);
        assert_eq!(key.as_str(), "a%7Ctag:b|tag:c%25d");
        let decoded = CacheKey::decode(key.as_str()).expect("decodes");
        assert_eq!(decoded.base(), "a|tag:b");
        assert_eq!(decoded.tags(), &["c%d".to_string()]);
    }

    #[test]
    fn test_tag_prefix_does_not_match_longer_tag() {
        let key = CacheKey::new("brokers:all", ["brokers-eu"]);
        assert!(!key.has_tag("brokers"));
        assert!(key.has_tag("brokers-eu"));
    }

    #[test]
    fn test_parse_lenient_falls_back_to_literal() {
        let key = CacheKey::parse_lenient("weird|key");
        assert_eq!(key.base(), "weird|key");
        assert!(!key.has_tags());

        let key = CacheKey::parse_lenient("rankings:all|tag:rankings");
        assert_eq!(key.base(), "rankings:all");
        assert!(key.has_tag("rankings"));
    }

    #[test]
    fn test_variant_prefix() {
        let key = CacheKey::new("brokers:all", ["brokers"]);
        assert_eq!(key.variant_prefix(), "brokers:all|");
        assert!(key.as_str().starts_with(&key.variant_prefix()));
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            base in "[a-z:|%]{0,12}",
            tags in prop::collection::vec("[a-z|%-]{1,8}", 0..4),
        ) {
            let key = CacheKey::new(base.clone(), &tags);
            let decoded = CacheKey::decode(key.as_str()).expect("encoded keys decode");
            prop_assert_eq!(decoded, key);
        }
    }
}
