use crate::core::domain::error::{ProxmoxResult, ValidationError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RX_TAG: Regex = Regex::new(r"^[a-z0-9_][a-z0-9_-]*$").unwrap();
}

const TAG_MAX_LEN: usize = 124;

pub(crate) fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() {
        return Err(ValidationError::field("tag", "may not be empty"));
    }
    if tag.len() > TAG_MAX_LEN {
        return Err(ValidationError::field(
            "tag",
            format!("may not be longer than {TAG_MAX_LEN} characters"),
        ));
    }
    if !RX_TAG.is_match(tag) {
        return Err(ValidationError::field(
            "tag",
            "may only contain lowercase letters, digits, '_' and '-', and may not start with '-'",
        ));
    }
    Ok(())
}

/// A single guest tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> ProxmoxResult<Self> {
        let tag = tag.into();
        validate_tag(&tag)?;
        Ok(Self(tag))
    }

    pub(crate) fn new_unchecked(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encodes a tag list for the `tags` option: de-duplicated and
    /// lexicographically sorted, semicolon-joined.
    pub(crate) fn list_to_api(tags: &[Tag]) -> String {
        let mut names: Vec<&str> = tags.iter().map(Tag::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names.join(";")
    }

    /// Decodes the `tags` option. PVE joins with `;` but historically also
    /// accepted `,`; both are split here.
    pub(crate) fn list_from_api(raw: &str) -> Vec<Tag> {
        raw.split([';', ','])
            .filter(|t| !t.is_empty())
            .map(Tag::new_unchecked)
            .collect()
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tags() {
        for tag in ["prod", "web-01", "a", "_hidden", "ubuntu_22"] {
            assert!(Tag::new(tag).is_ok(), "tag {tag} should be valid");
        }
    }

    #[test]
    fn test_invalid_tags() {
        for tag in ["", "-leading", "UPPER", "with space", "ünïcode"] {
            assert!(Tag::new(tag).is_err(), "tag {tag:?} should be rejected");
        }
    }

    #[test]
    fn test_list_encoding_sorts_and_dedups() {
        let tags = vec![
            Tag::new_unchecked("web"),
            Tag::new_unchecked("db"),
            Tag::new_unchecked("web"),
        ];
        assert_eq!(Tag::list_to_api(&tags), "db;web");
    }

    #[test]
    fn test_list_decoding_accepts_both_separators() {
        let tags = Tag::list_from_api("a;b,c");
        let names: Vec<&str> = tags.iter().map(Tag::as_str).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
