use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use expman_core::errors::{ErrorInfo, ExpError};
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

/// File extensions recognised as model checkpoints.
pub const CHECKPOINT_EXTENSIONS: [&str; 3] = ["ckpt", "pt", "pth"];
/// Name of the experiment tracking tool whose run directory is recorded.
pub const TRACKING_DIR: &str = "wandb";
/// File name under which a run's config snapshot is copied.
pub const CONFIG_SNAPSHOT_NAME: &str = "config_snapshot.yaml";

/// The `files` section of an id card. Absent artifacts are omitted entirely.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactIndex {
    /// Checkpoint paths, newest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<String>,
    /// The newest checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<String>,
    /// Tracking tool run directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wandb: Option<String>,
    /// Copied config snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Matches per extra-file glob pattern.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl ArtifactIndex {
    /// True when nothing was discovered.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
            && self.wandb.is_none()
            && self.config.is_none()
            && self.extra.is_empty()
    }
}

/// Scans `dir` for checkpoints, the tracking directory, the config snapshot
/// and the given extra-file patterns.
pub fn discover_artifacts(dir: &Path, extra_patterns: &[String]) -> Result<ArtifactIndex, ExpError> {
    let checkpoints = find_checkpoints(dir);
    let best = checkpoints.first().cloned();
    let snapshot = dir.join(CONFIG_SNAPSHOT_NAME);
    let index = ArtifactIndex {
        best,
        checkpoints,
        wandb: find_tracking_dir(dir).map(|path| display(&path)),
        config: snapshot.is_file().then(|| display(&snapshot)),
        extra: find_extra_files(dir, extra_patterns)?,
    };
    debug!(
        dir = %dir.display(),
        checkpoints = index.checkpoints.len(),
        tracking = index.wandb.is_some(),
        extra = index.extra.len(),
        "artifact discovery finished"
    );
    Ok(index)
}

/// Recursively collects checkpoint files, newest modification time first.
///
/// Entries whose metadata cannot be read are skipped. Ties keep walk order.
pub fn find_checkpoints(dir: &Path) -> Vec<String> {
    let mut found: Vec<(SystemTime, PathBuf)> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_checkpoint(entry.path()))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.into_path()))
        })
        .collect();
    found.sort_by(|a, b| b.0.cmp(&a.0));
    found.into_iter().map(|(_, path)| display(&path)).collect()
}

fn is_checkpoint(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CHECKPOINT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Returns `dir/wandb` if present, else the first nested directory whose name contains `wandb`.
pub fn find_tracking_dir(dir: &Path) -> Option<PathBuf> {
    let direct = dir.join(TRACKING_DIR);
    if direct.is_dir() {
        return Some(direct);
    }
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map(|name| name.contains(TRACKING_DIR))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher, ExpError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| {
            ExpError::InvalidConfiguration(
                ErrorInfo::new("discovery.glob", err.to_string())
                    .with_context("pattern", pattern),
            )
        })
}

/// Matches each pattern against paths relative to `dir`. Patterns without
/// matches are left out of the result.
pub fn find_extra_files(
    dir: &Path,
    patterns: &[String],
) -> Result<BTreeMap<String, Vec<String>>, ExpError> {
    let mut found = BTreeMap::new();
    if patterns.is_empty() {
        return Ok(found);
    }
    let matchers = patterns
        .iter()
        .map(|pattern| build_matcher(pattern).map(|matcher| (pattern, matcher)))
        .collect::<Result<Vec<_>, _>>()?;
    let entries: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .collect();
    for (pattern, matcher) in matchers {
        let mut matches: Vec<String> = entries
            .iter()
            .filter(|path| {
                path.strip_prefix(dir)
                    .map(|rel| matcher.is_match(rel))
                    .unwrap_or(false)
            })
            .map(|path| display(path))
            .collect();
        if matches.is_empty() {
            continue;
        }
        matches.sort();
        found.insert(pattern.clone(), matches);
    }
    Ok(found)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
