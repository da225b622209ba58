use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use expman_core::codec::{from_json_slice, to_pretty_json_bytes};
use expman_core::errors::{ErrorInfo, ExpError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::discovery::ArtifactIndex;
use crate::environment::EnvironmentSnapshot;
use crate::policy::{IdMode, Policy, DEFAULT_HASH_LENGTH, DEFAULT_ID_CARD_NAME};
use crate::project::ConfigSummary;

/// Policy fields echoed into every id card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEcho {
    /// Requested keep paths.
    pub keep_keys: Vec<String>,
    /// Naming mode used for the directory.
    pub id_mode: IdMode,
    /// Hash or token length.
    pub hash_length: usize,
    /// Whether the meta block was requested.
    pub include_meta: bool,
    /// Listing tags.
    pub tags: Vec<String>,
    /// Extra-file glob patterns.
    pub extra_files: Vec<String>,
    /// Id card file name.
    pub id_card_name: String,
    /// Repository whose commit was recorded.
    pub model_repo: Option<PathBuf>,
}

impl Default for PolicyEcho {
    fn default() -> Self {
        Self {
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

impl From<&Policy> for PolicyEcho {
    fn from(policy: &Policy) -> Self {
        Self {
            keep_keys: policy.keep_keys.clone(),
            id_mode: policy.id_mode,
            hash_length: policy.hash_length,
            include_meta: policy.include_meta,
            tags: policy.tags.clone(),
            extra_files: policy.extra_files.clone(),
            id_card_name: policy.id_card_name.clone(),
            model_repo: policy.model_repo.clone(),
        }
    }
}

impl PolicyEcho {
    /// Rebuilds the policy that produced a card, for rescans without a profile file.
    pub fn to_policy(&self, description: &str) -> Policy {
        Policy {
            description: description.to_string(),
            keep_keys: self.keep_keys.clone(),
            id_mode: self.id_mode,
            hash_length: self.hash_length,
            include_meta: self.include_meta,
            tags: self.tags.clone(),
            extra_files: self.extra_files.clone(),
            id_card_name: self.id_card_name.clone(),
            model_repo: self.model_repo.clone(),
        }
    }
}

/// The id card persisted in every experiment directory.
///
/// Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    /// Directory name of the experiment.
    pub id: String,
    /// Short content hash of the config summary.
    #[serde(default)]
    pub stable_hash: Option<String>,
    /// ISO-8601 creation time with offset.
    #[serde(default)]
    pub created_at: String,
    /// Free-form description from the policy.
    #[serde(default)]
    pub description: String,
    /// Policy used at registration.
    #[serde(default)]
    pub profile: PolicyEcho,
    /// Projected configuration.
    #[serde(default)]
    pub config_summary: ConfigSummary,
    /// Discovered artifacts.
    #[serde(default)]
    pub files: ArtifactIndex,
    /// Environment snapshot, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EnvironmentSnapshot>,
}

impl ExperimentRecord {
    /// Reads a typed record from `path`.
    pub fn load(path: &Path) -> Result<Self, ExpError> {
        let document = read_record_document(path)?;
        serde_json::from_value(Value::Object(document)).map_err(|err| {
            ExpError::Serde(
                ErrorInfo::new("record.schema", err.to_string())
                    .with_path(path)
                    .with_context("operation", "load id card"),
            )
        })
    }

    /// Tags echoed from the registering policy.
    pub fn tags(&self) -> &[String] {
        &self.profile.tags
    }
}

/// Location of the id card inside `dir`.
pub fn record_path(dir: &Path, id_card_name: &str) -> PathBuf {
    dir.join(id_card_name)
}

/// Reads an id card as an untyped JSON object, preserving key order.
pub fn read_record_document(path: &Path) -> Result<Map<String, Value>, ExpError> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ExpError::NotFound(
            ErrorInfo::new("record.missing", "id card not found")
                .with_path(path)
                .with_context("operation", "read id card"),
        ),
        _ => ExpError::io("record.read", path, err),
    })?;
    let value: Value = from_json_slice(&bytes).map_err(|err| match err {
        ExpError::Serde(info) => ExpError::Serde(info.with_path(path)),
        other => other,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExpError::Serde(
            ErrorInfo::new("record.shape", "id card is not a JSON object").with_path(path),
        )),
    }
}

/// Writes `value` as pretty JSON to `path` through a temporary sibling that is
/// renamed over the target, so readers see either the old or the new card.
pub fn write_record_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ExpError> {
    write_record_with(path, value, |tmp, target| {
        tmp.persist(target).map(drop).map_err(|err| err.error)
    })
}

/// Body of [`write_record_atomic`] with the final rename supplied by the caller.
/// A temporary file handed to `commit` is removed when the commit fails.
fn write_record_with<T, F>(path: &Path, value: &T, commit: F) -> Result<(), ExpError>
where
    T: Serialize,
    F: FnOnce(NamedTempFile, &Path) -> io::Result<()>,
{
    let bytes = to_pretty_json_bytes(value)?;
    let parent = path.parent().ok_or_else(|| {
        ExpError::InvalidConfiguration(
            ErrorInfo::new("record.parent", "id card path has no parent directory")
                .with_path(path),
        )
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| ExpError::io("record.tmp", parent, err))?;
    tmp.write_all(&bytes)
        .map_err(|err| ExpError::io("record.write", tmp.path(), err))?;
    tmp.as_file()
        .sync_all()
        .map_err(|err| ExpError::io("record.sync", tmp.path(), err))?;
    commit(tmp, path).map_err(|err| ExpError::io("record.persist", path, err))?;
    debug!(path = %path.display(), bytes = bytes.len(), "id card written");
    Ok(())
}
