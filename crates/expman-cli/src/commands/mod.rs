use std::path::{Path, PathBuf};

use expman_registry::Settings;

pub mod ckpt;
pub mod create;
pub mod inspect;
pub mod list;
pub mod refresh;

/// `--exp-root` with `~` expanded, else the configured default.
pub fn resolve_root(settings: &Settings, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => settings.expand(&path.to_string_lossy()),
        None => settings.exp_root.clone(),
    }
}
