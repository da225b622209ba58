use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use expman_core::errors::{ErrorInfo, ExpError};
use serde::{Deserialize, Serialize};

/// Default file name of the id card written into every experiment directory.
pub const DEFAULT_ID_CARD_NAME: &str = "id_card.json";
/// Default number of hex characters kept from the content hash.
pub const DEFAULT_HASH_LENGTH: usize = 8;

const MAX_HASH_LENGTH: usize = 64;
const MAX_TOKEN_LENGTH: usize = 32;

/// Strategy used to name new experiment directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdMode {
    /// `exp_<hash>` derived from the config summary.
    #[default]
    Hash,
    /// `exp_0001`, `exp_0002`, ...
    Sequential,
    /// `exp_YYYYMMDD_HHMMSS` in local time.
    Timestamp,
    /// `exp_<random hex token>`.
    Uuid,
}

impl IdMode {
    /// Canonical name used in policy files and id cards.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdMode::Hash => "hash",
            IdMode::Sequential => "sequential",
            IdMode::Timestamp => "timestamp",
            IdMode::Uuid => "uuid",
        }
    }
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdMode {
    type Err = ExpError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "hash" | "content-hash" => Ok(IdMode::Hash),
            "sequential" => Ok(IdMode::Sequential),
            "timestamp" => Ok(IdMode::Timestamp),
            "uuid" | "random" => Ok(IdMode::Uuid),
            other => Err(ExpError::InvalidConfiguration(
                ErrorInfo::new("policy.id_mode", format!("unknown id_mode: {other}"))
                    .with_hint("expected one of hash, sequential, timestamp, uuid"),
            )),
        }
    }
}

impl TryFrom<String> for IdMode {
    type Error = ExpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdMode> for String {
    fn from(mode: IdMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Naming and config selection policy, usually read from a YAML profile file.
///
/// Unknown fields are rejected so that a typo in a profile fails loudly
/// instead of silently falling back to a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Human readable description copied into every id card.
    pub description: String,
    /// Dotted config paths kept in the summary; empty keeps everything.
    pub keep_keys: Vec<String>,
    /// Directory naming strategy.
    pub id_mode: IdMode,
    /// Number of characters of the hash (or random token) used in names.
    pub hash_length: usize,
    /// Whether to record user, host and version-control metadata.
    pub include_meta: bool,
    /// Free-form tags shown in listings.
    pub tags: Vec<String>,
    /// Glob patterns, relative to the experiment directory, listed under `files.extra`.
    pub extra_files: Vec<String>,
    /// File name of the id card.
    pub id_card_name: String,
    /// Repository whose commit is recorded; defaults to the working directory.
    pub model_repo: Option<PathBuf>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            description: String::new(),
            keep_keys: Vec::new(),
            id_mode: IdMode::Hash,
            hash_length: DEFAULT_HASH_LENGTH,
            include_meta: true,
            tags: Vec::new(),
            extra_files: Vec::new(),
            id_card_name: DEFAULT_ID_CARD_NAME.to_string(),
            model_repo: None,
        }
    }
}

impl Policy {
    /// Reads and validates a YAML profile file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ExpError> {
        Self::from_yaml_file_with_card_name(path, DEFAULT_ID_CARD_NAME)
    }

    /// Reads a YAML profile file; `card_name` fills `id_card_name` when the
    /// profile leaves it unset.
    pub fn from_yaml_file_with_card_name(path: &Path, card_name: &str) -> Result<Self, ExpError> {
        if !path.exists() {
            return Err(ExpError::NotFound(
                ErrorInfo::new("policy.missing", "profile file not found")
                    .with_path(path)
                    .with_context("operation", "load profile"),
            ));
        }
        let contents =
            fs::read_to_string(path).map_err(|err| ExpError::io("policy.read", path, err))?;
        Self::from_yaml_str_with_card_name(&contents, card_name).map_err(|err| match err {
            ExpError::InvalidConfiguration(info) => {
                ExpError::InvalidConfiguration(info.with_path(path))
            }
            other => other,
        })
    }

    /// Parses and validates a YAML profile document. An empty document yields the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ExpError> {
        Self::from_yaml_str_with_card_name(text, DEFAULT_ID_CARD_NAME)
    }

    /// Parses a YAML profile document with `card_name` as the `id_card_name` default.
    pub fn from_yaml_str_with_card_name(text: &str, card_name: &str) -> Result<Self, ExpError> {
        let mut document: serde_yaml::Value = serde_yaml::from_str(text).map_err(|err| {
            ExpError::InvalidConfiguration(ErrorInfo::new("policy.parse", err.to_string()))
        })?;
        if document.is_null() {
            let policy = Self {
                id_card_name: card_name.to_string(),
                ..Self::default()
            };
            policy.validate()?;
            return Ok(policy);
        }
        if let serde_yaml::Value::Mapping(map) = &mut document {
            if !map.contains_key("id_card_name") {
                map.insert("id_card_name".into(), card_name.into());
            }
        }
        let policy: Policy = serde_yaml::from_value(document).map_err(|err| {
            ExpError::InvalidConfiguration(ErrorInfo::new("policy.parse", err.to_string()))
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Builds a policy from a literal mapping.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ExpError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let policy: Policy = serde_json::from_value(value).map_err(|err| {
            ExpError::InvalidConfiguration(ErrorInfo::new("policy.parse", err.to_string()))
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Checks bounds that serde cannot express.
    pub fn validate(&self) -> Result<(), ExpError> {
        let max = match self.id_mode {
            IdMode::Uuid => MAX_TOKEN_LENGTH,
            _ => MAX_HASH_LENGTH,
        };
        if self.hash_length == 0 || self.hash_length > max {
            return Err(ExpError::InvalidConfiguration(
                ErrorInfo::new(
                    "policy.hash_length",
                    format!("hash_length must be between 1 and {max}"),
                )
                .with_context("hash_length", self.hash_length.to_string())
                .with_context("id_mode", self.id_mode.as_str()),
            ));
        }
        let name = self.id_card_name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(ExpError::InvalidConfiguration(
                ErrorInfo::new(
                    "policy.id_card_name",
                    "id_card_name must be a plain file name",
                )
                .with_context("id_card_name", self.id_card_name.clone()),
            ));
        }
        Ok(())
    }
}
