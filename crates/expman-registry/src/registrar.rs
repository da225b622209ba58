use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use expman_core::errors::{ErrorInfo, ExpError};
use serde_json::Value;
use tracing::{debug, info};

use crate::discovery::discover_artifacts;
use crate::environment::{CommitInfoProvider, EnvironmentSnapshot, GitCli, HostContext};
use crate::naming::{content_hash, derive_name};
use crate::normalize::Normalizable;
use crate::policy::{IdMode, Policy};
use crate::project::project;
use crate::record::{
    read_record_document, record_path, write_record_atomic, ExperimentRecord, PolicyEcho,
};
use crate::settings::Settings;
use crate::staging::{copy_config_snapshot, locate_config_snapshot, stage_run_artifacts};

/// Per-call knobs for [`Registrar::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Use this directory instead of deriving one under the root.
    pub explicit_dir: Option<PathBuf>,
    /// Config file copied in as `config_snapshot.yaml`.
    pub config_snapshot: Option<PathBuf>,
    /// Finished run whose artifacts are copied into the new directory.
    pub stage_from: Option<PathBuf>,
    /// Rescan artifacts after the first write and return the refreshed card.
    pub refresh_after: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            explicit_dir: None,
            config_snapshot: None,
            stage_from: None,
            refresh_after: true,
        }
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Absolute experiment directory.
    pub dir: PathBuf,
    /// The card as persisted.
    pub record: ExperimentRecord,
}

/// Creates experiment directories and keeps their id cards up to date.
pub struct Registrar {
    settings: Settings,
    host: HostContext,
    commits: Box<dyn CommitInfoProvider>,
}

impl Registrar {
    /// Builds a registrar from explicit collaborators.
    pub fn new(
        settings: Settings,
        host: HostContext,
        commits: Box<dyn CommitInfoProvider>,
    ) -> Self {
        Self {
            settings,
            host,
            commits,
        }
    }

    /// Registrar for the running process, recording commits through `git`.
    pub fn from_settings(settings: Settings) -> Self {
        Self::new(settings, HostContext::capture(), Box::new(GitCli::default()))
    }

    /// Settings the registrar was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Loads the profile at `path`, falling back to the configured profile and
    /// then to the default policy. The configured id card name applies unless
    /// the profile names its own.
    pub fn load_policy(&self, path: Option<&Path>) -> Result<Policy, ExpError> {
        match path.or(self.settings.profile.as_deref()) {
            Some(path) => Policy::from_yaml_file_with_card_name(path, &self.settings.id_card_name),
            None => {
                let policy = Policy {
                    id_card_name: self.settings.id_card_name.clone(),
                    ..Policy::default()
                };
                policy.validate()?;
                Ok(policy)
            }
        }
    }

    /// Registers a run under `root` (or `options.explicit_dir`) and writes its id card.
    pub fn register<N: Normalizable + ?Sized>(
        &self,
        policy: &Policy,
        raw_config: &N,
        root: &Path,
        options: &RegisterOptions,
    ) -> Result<Registration, ExpError> {
        policy.validate()?;
        let summary = project(raw_config, &policy.keep_keys);
        let stable_hash = content_hash(&summary, policy.hash_length)?;
        let dir = match &options.explicit_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|err| ExpError::io("register.mkdir", dir, err))?;
                dir.clone()
            }
            None => {
                let name = derive_name(root, policy, &summary)?;
                create_experiment_dir(root, &name, policy.id_mode)?
            }
        };
        let dir = fs::canonicalize(&dir).map_err(|err| ExpError::io("register.resolve", &dir, err))?;

        if let Some(input) = &options.stage_from {
            stage_run_artifacts(input, &dir)?;
        }
        let snapshot = options
            .config_snapshot
            .clone()
            .or_else(|| options.stage_from.as_deref().and_then(locate_config_snapshot));
        if let Some(snapshot) = snapshot {
            copy_config_snapshot(&snapshot, &dir);
        }

        let card_path = record_path(&dir, &policy.id_card_name);
        let created_at = previous_created_at(&card_path, &stable_hash)
            .unwrap_or_else(|| Local::now().to_rfc3339_opts(SecondsFormat::Micros, false));
        let meta = policy.include_meta.then(|| {
            let repo = policy.model_repo.as_deref().unwrap_or(&self.host.cwd);
            EnvironmentSnapshot::collect(&self.host, repo, self.commits.as_ref())
        });
        let record = ExperimentRecord {
            id: dir_name(&dir),
            stable_hash: Some(stable_hash),
            created_at,
            description: policy.description.clone(),
            profile: PolicyEcho::from(policy),
            config_summary: summary,
            files: discover_artifacts(&dir, &policy.extra_files)?,
            meta,
        };
        write_record_atomic(&card_path, &record)?;
        info!(id = %record.id, dir = %dir.display(), mode = %policy.id_mode, "experiment registered");

        let record = if options.refresh_after {
            self.refresh_artifacts(&dir, policy)?
        } else {
            record
        };
        Ok(Registration { dir, record })
    }

    /// Rescans `dir` and rewrites only the `files` section of its id card.
    pub fn refresh_artifacts(&self, dir: &Path, policy: &Policy) -> Result<ExperimentRecord, ExpError> {
        let card_path = record_path(dir, &policy.id_card_name);
        let mut document = read_record_document(&card_path)?;
        let dir = fs::canonicalize(dir).map_err(|err| ExpError::io("refresh.resolve", dir, err))?;
        let files = discover_artifacts(&dir, &policy.extra_files)?;
        let files = serde_json::to_value(&files).map_err(|err| {
            ExpError::Serde(ErrorInfo::new("refresh.files", err.to_string()).with_path(&card_path))
        })?;
        document.insert("files".to_string(), files);
        write_record_atomic(&card_path, &document)?;
        info!(dir = %dir.display(), "artifacts refreshed");
        serde_json::from_value(Value::Object(document)).map_err(|err| {
            ExpError::Serde(
                ErrorInfo::new("record.schema", err.to_string())
                    .with_path(&card_path)
                    .with_context("operation", "refresh artifacts"),
            )
        })
    }
}

fn create_experiment_dir(root: &Path, name: &str, mode: IdMode) -> Result<PathBuf, ExpError> {
    fs::create_dir_all(root).map_err(|err| ExpError::io("register.root", root, err))?;
    let dir = root.join(name);
    if mode == IdMode::Hash {
        if dir.is_dir() {
            debug!(dir = %dir.display(), "reusing content-addressed directory");
        }
        fs::create_dir_all(&dir).map_err(|err| ExpError::io("register.mkdir", &dir, err))?;
        return Ok(dir);
    }
    match fs::create_dir(&dir) {
        Ok(()) => Ok(dir),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(ExpError::Conflict(
            ErrorInfo::new("register.exists", "experiment directory already exists")
                .with_path(&dir)
                .with_context("id_mode", mode.as_str())
                .with_hint("retry the registration to derive a fresh name"),
        )),
        Err(err) => Err(ExpError::io("register.mkdir", &dir, err)),
    }
}

/// Creation time of an existing card describing the same content, if any.
fn previous_created_at(card_path: &Path, stable_hash: &str) -> Option<String> {
    let document = read_record_document(card_path).ok()?;
    let same_content = document.get("stable_hash").and_then(Value::as_str) == Some(stable_hash);
    if !same_content {
        return None;
    }
    document
        .get("created_at")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}
