//! Collision-resistant stored file names.
//!
//! A stored name has the shape
//! `{yyyyMMdd_HHmmss}_{8 hex chars}_{sanitized stem}{sanitized extension}`.
//! The timestamp and random id make concurrent writes of the same original
//! name land on distinct paths without any coordination.

use std::ops::RangeInclusive;

use chrono::{Local, NaiveDateTime};

const STORED_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const SHORT_ID_LEN: usize = 8;
const UNNAMED: &str = "unnamed";

/// Decides which characters survive sanitization.
///
/// ASCII letters, digits, `.`, `_` and `-` are always kept. Additional
/// letter ranges (for example Hangul syllables) are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePolicy {
    extra_letters: Vec<RangeInclusive<char>>,
}

impl Default for FilenamePolicy {
    fn default() -> Self {
        Self {
            extra_letters: vec!['가'..='힣'],
        }
    }
}

impl FilenamePolicy {
    /// A policy that keeps only the ASCII set.
    pub fn ascii_only() -> Self {
        Self {
            extra_letters: Vec::new(),
        }
    }

    pub fn with_letters(extra_letters: Vec<RangeInclusive<char>>) -> Self {
        Self { extra_letters }
    }

    /// Parses `"가-힣"` (an inclusive range) or a single character.
    pub fn parse_range(range: &str) -> Option<RangeInclusive<char>> {
        let chars: Vec<char> = range.chars().collect();
        match chars.as_slice() {
            [c] => Some(*c..=*c),
            [start, '-', end] if start <= end => Some(*start..=*end),
            _ => None,
        }
    }

    pub fn allows(&self, c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(c, '.' | '_' | '-')
            || self.extra_letters.iter().any(|r| r.contains(&c))
    }

    /// Replaces every disallowed character with `_`.
    pub fn sanitize(&self, value: &str) -> String {
        value
            .chars()
            .map(|c| if self.allows(c) { c } else { '_' })
            .collect()
    }

    /// Builds a fresh stored name for `original` using the current time.
    pub fn stored_name(&self, original: &str) -> String {
        self.stored_name_at(original, Local::now().naive_local(), &short_id())
    }

    pub fn stored_name_at(&self, original: &str, at: NaiveDateTime, id: &str) -> String {
        let (stem, ext) = split_extension(original);
        let stem = if stem.is_empty() {
            UNNAMED.to_string()
        } else {
            self.sanitize(stem)
        };
        format!(
            "{}_{}_{}{}",
            at.format(STORED_TIMESTAMP_FORMAT),
            id,
            stem,
            self.sanitize(ext)
        )
    }
}

/// Reduces a client-supplied file name to its final path component.
///
/// Browsers on some platforms send full paths; both separators are handled.
pub fn clean_original(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if last.is_empty() || last == "." || last == ".." {
        UNNAMED.to_string()
    } else {
        last.to_string()
    }
}

/// Splits at the last `.`, unless the name starts with it (`.bashrc`).
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// First 8 hex characters of a random UUID.
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(SHORT_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    #[test]
    fn stored_name_shape() {
        let policy = FilenamePolicy::default();
        assert_eq!(
            policy.stored_name_at("report final.txt", at(), "abcd1234"),
            "20240309_140507_abcd1234_report_final.txt"
        );
    }

    #[test]
    fn keeps_hangul_by_default() {
        let policy = FilenamePolicy::default();
        assert_eq!(
            policy.stored_name_at("보고서 (1).pdf", at(), "00000000"),
            "20240309_140507_00000000_보고서__1_.pdf"
        );
    }

    #[test]
    fn ascii_only_replaces_hangul() {
        let policy = FilenamePolicy::ascii_only();
        assert_eq!(policy.sanitize("보고서.pdf"), "___.pdf");
    }

    #[test]
    fn custom_letters() {
        let policy = FilenamePolicy::with_letters(vec![FilenamePolicy::parse_range("à-ÿ").unwrap()]);
        assert_eq!(policy.sanitize("café crème"), "café_crème");
    }

    #[test]
    fn parse_range_forms() {
        assert_eq!(FilenamePolicy::parse_range("가-힣"), Some('가'..='힣'));
        assert_eq!(FilenamePolicy::parse_range("é"), Some('é'..='é'));
        assert_eq!(FilenamePolicy::parse_range("z-a"), None);
        assert_eq!(FilenamePolicy::parse_range("abc"), None);
        assert_eq!(FilenamePolicy::parse_range(""), None);
    }

    #[test]
    fn extension_rules() {
        assert_eq!(split_extension("a.txt"), ("a", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }

    #[test]
    fn extension_is_sanitized() {
        let policy = FilenamePolicy::default();
        let name = policy.stored_name_at("x.t/x", at(), "id");
        assert_eq!(name, "20240309_140507_id_x.t_x");
    }

    #[test]
    fn clean_original_strips_directories() {
        assert_eq!(clean_original("C:\\Users\\me\\a.txt"), "a.txt");
        assert_eq!(clean_original("dir/sub/b.bin"), "b.bin");
        assert_eq!(clean_original("../../etc/passwd"), "passwd");
        assert_eq!(clean_original(""), "unnamed");
        assert_eq!(clean_original(".."), "unnamed");
    }

    #[test]
    fn empty_stem_is_unnamed() {
        let policy = FilenamePolicy::default();
        assert_eq!(policy.stored_name_at("", at(), "id"), "20240309_140507_id_unnamed");
    }

    #[test]
    fn short_ids_are_hex() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(short_id(), short_id());
    }
}
