use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use expman_core::errors::{ErrorInfo, ExpError};
use expman_core::hash::short_hash;
use rand::Rng;

use crate::policy::{IdMode, Policy};
use crate::project::ConfigSummary;

/// Prefix shared by every generated experiment directory name.
pub const EXP_PREFIX: &str = "exp_";
/// Zero-padding width of sequential names.
pub const SEQUENCE_WIDTH: usize = 4;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Short content hash of the summary's canonical JSON form.
pub fn content_hash(summary: &ConfigSummary, length: usize) -> Result<String, ExpError> {
    short_hash(summary, length)
}

/// Derives the directory name for a new experiment under `root`.
///
/// Sequential naming creates `root` if needed so it can be scanned. Two
/// processes deriving a sequential name at the same time may pick the same
/// number; registrations must be serialized externally.
pub fn derive_name(
    root: &Path,
    policy: &Policy,
    summary: &ConfigSummary,
) -> Result<String, ExpError> {
    match policy.id_mode {
        IdMode::Sequential => next_sequential_name(root),
        IdMode::Hash => Ok(format!(
            "{EXP_PREFIX}{}",
            content_hash(summary, policy.hash_length)?
        )),
        IdMode::Timestamp => Ok(timestamp_name(&Local::now())),
        IdMode::Uuid => Ok(format!("{EXP_PREFIX}{}", random_token(policy.hash_length))),
    }
}

/// Parses the counter of a sequential name such as `exp_0042`.
pub fn sequence_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(EXP_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Returns one past the highest sequential name under `root`, ignoring gaps.
pub fn next_sequential_name(root: &Path) -> Result<String, ExpError> {
    fs::create_dir_all(root).map_err(|err| ExpError::io("naming.root", root, err))?;
    let entries = fs::read_dir(root).map_err(|err| ExpError::io("naming.scan", root, err))?;
    let mut highest = 0u64;
    for entry in entries {
        let entry = entry.map_err(|err| ExpError::io("naming.scan", root, err))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(number) = entry.file_name().to_str().and_then(sequence_number) {
            highest = highest.max(number);
        }
    }
    let next = highest.checked_add(1).ok_or_else(|| {
        ExpError::Conflict(
            ErrorInfo::new("naming.overflow", "sequential counter exhausted").with_path(root),
        )
    })?;
    Ok(format!("{EXP_PREFIX}{next:0width$}", width = SEQUENCE_WIDTH))
}

/// Formats `now` with second granularity, e.g. `exp_20261019_143005`.
pub fn timestamp_name(now: &DateTime<Local>) -> String {
    format!("{EXP_PREFIX}{}", now.format("%Y%m%d_%H%M%S"))
}

/// Random lowercase hex token of `length` characters.
pub fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn summary(value: serde_json::Value) -> ConfigSummary {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sequential_skips_gaps_and_foreign_dirs() {
        let root = tempfile::tempdir().unwrap();
        for name in ["exp_0001", "exp_0003", "exp_20240101_120000", "exp_abc", "notes"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("exp_0009"), b"a file, not a directory").unwrap();
        assert_eq!(next_sequential_name(root.path()).unwrap(), "exp_0004");
    }

    #[test]
    fn sequential_starts_at_one_and_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("root");
        assert_eq!(next_sequential_name(&root).unwrap(), "exp_0001");
        assert!(root.is_dir());
    }

    #[test]
    fn sequence_number_requires_only_digits() {
        assert_eq!(sequence_number("exp_0042"), Some(42));
        assert_eq!(sequence_number("exp_12345"), Some(12345));
        assert_eq!(sequence_number("exp_"), None);
        assert_eq!(sequence_number("exp_12a"), None);
        assert_eq!(sequence_number("run_0001"), None);
    }

    #[test]
    fn hash_names_depend_only_on_summary_content() {
        let root = Path::new("/unused");
        let policy = Policy::default();
        let mut reordered = ConfigSummary::new();
        reordered.insert("b".into(), json!({"y": 2, "x": 1}));
        reordered.insert("a".into(), json!(1));
        let left = derive_name(root, &policy, &summary(json!({"a": 1, "b": {"x": 1, "y": 2}})))
            .unwrap();
        let right = derive_name(root, &policy, &reordered).unwrap();
        assert_eq!(left, right);
        assert_eq!(left.len(), EXP_PREFIX.len() + policy.hash_length);

        let other = derive_name(root, &policy, &summary(json!({"a": 2}))).unwrap();
        assert_ne!(left, other);
    }

    #[test]
    fn timestamp_name_uses_second_granularity() {
        let now = Local.with_ymd_and_hms(2026, 10, 19, 14, 30, 5).unwrap();
        assert_eq!(timestamp_name(&now), "exp_20261019_143005");
    }

    #[test]
    fn random_tokens_have_requested_length() {
        let token = random_token(12);
        assert_eq!(token.len(), 12);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(random_token(32), random_token(32));
    }
}
