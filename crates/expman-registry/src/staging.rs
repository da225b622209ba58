use std::fs;
use std::path::{Path, PathBuf};

use expman_core::errors::{ErrorInfo, ExpError};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::discovery::CONFIG_SNAPSHOT_NAME;

/// Subdirectories of a finished run copied into the experiment directory.
pub const STAGED_SUBDIRS: [&str; 3] = ["checkpoints", "wandb", ".hydra"];

const HYDRA_CONFIG: &str = ".hydra/config.yaml";

/// Copies the known artifact subtrees of `input_dir` into `exp_dir`.
///
/// Missing subtrees are skipped. Existing files in `exp_dir` are overwritten.
/// Returns the subdirectories that were copied.
pub fn stage_run_artifacts(input_dir: &Path, exp_dir: &Path) -> Result<Vec<String>, ExpError> {
    if !input_dir.is_dir() {
        return Err(ExpError::NotFound(
            ErrorInfo::new("staging.input", "input run directory not found")
                .with_path(input_dir)
                .with_context("operation", "stage run artifacts"),
        ));
    }
    let mut staged = Vec::new();
    for sub in STAGED_SUBDIRS {
        let src = input_dir.join(sub);
        if !src.is_dir() {
            debug!(path = %src.display(), "nothing to stage");
            continue;
        }
        let copied = copy_tree(&src, &exp_dir.join(sub))?;
        info!(subdir = sub, files = copied, "staged run artifacts");
        staged.push(sub.to_string());
    }
    Ok(staged)
}

fn copy_tree(src: &Path, dest: &Path) -> Result<usize, ExpError> {
    let mut copied = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            ExpError::Io(
                ErrorInfo::new("staging.walk", err.to_string())
                    .with_path(src)
                    .with_context("operation", "stage run artifacts"),
            )
        })?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| ExpError::io("staging.mkdir", &target, err))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| ExpError::io("staging.mkdir", parent, err))?;
            }
            fs::copy(entry.path(), &target)
                .map_err(|err| ExpError::io("staging.copy", entry.path(), err))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Returns `<input_dir>/.hydra/config.yaml` when it exists.
pub fn locate_config_snapshot(input_dir: &Path) -> Option<PathBuf> {
    let candidate = input_dir.join(HYDRA_CONFIG);
    candidate.is_file().then_some(candidate)
}

/// Copies `snapshot` into `exp_dir` as `config_snapshot.yaml`.
///
/// Failures are logged and reported as `None`; they never abort registration.
pub fn copy_config_snapshot(snapshot: &Path, exp_dir: &Path) -> Option<PathBuf> {
    let target = exp_dir.join(CONFIG_SNAPSHOT_NAME);
    match fs::copy(snapshot, &target) {
        Ok(_) => {
            debug!(from = %snapshot.display(), to = %target.display(), "config snapshot copied");
            Some(target)
        }
        Err(err) => {
            warn!(
                from = %snapshot.display(),
                error = %err,
                "could not copy config snapshot; continuing without it"
            );
            None
        }
    }
}
