use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use expman_core::{from_yaml_slice, to_pretty_json_bytes, ExpError};
use expman_registry::staging::locate_config_snapshot;
use expman_registry::{InterpolatedConfig, RegisterOptions, Registrar, Settings};
use serde_json::Value;
use tracing::info;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Profile YAML with naming mode and keep_keys; defaults to $EXPMAN_PROFILE.
    #[arg(long)]
    pub profile: Option<PathBuf>,
    /// Run config to summarize; defaults to <input-dir>/.hydra/config.yaml.
    #[arg(long)]
    pub cfg: Option<PathBuf>,
    /// Finished run whose checkpoints, wandb and .hydra directories are copied in.
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
    /// Register into this directory instead of deriving a name.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Keep ${...} references in the config as written.
    #[arg(long)]
    pub no_resolve: bool,
    /// Print the id card instead of a summary line.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &CreateArgs, root: &Path, settings: Settings) -> Result<(), Box<dyn Error>> {
    let registrar = Registrar::from_settings(settings);
    let policy = registrar.load_policy(args.profile.as_deref())?;
    let cfg = args
        .cfg
        .clone()
        .or_else(|| args.input_dir.as_deref().and_then(locate_config_snapshot));
    let raw = match &cfg {
        Some(path) => {
            info!(path = %path.display(), "reading run config");
            let bytes = fs::read(path).map_err(|err| ExpError::io("create.config", path, err))?;
            from_yaml_slice::<Value>(&bytes).map_err(|err| match err {
                ExpError::Serde(info) => ExpError::Serde(
                    info.with_path(path)
                        .with_context("operation", "read run config"),
                ),
                other => other,
            })?
        }
        None => Value::Object(Default::default()),
    };
    let options = RegisterOptions {
        explicit_dir: args.dir.clone(),
        config_snapshot: cfg,
        stage_from: args.input_dir.clone(),
        ..RegisterOptions::default()
    };
    let registration = if args.no_resolve {
        registrar.register(&policy, &raw, root, &options)?
    } else {
        registrar.register(&policy, &InterpolatedConfig::new(raw), root, &options)?
    };
    if args.json {
        let bytes = to_pretty_json_bytes(&registration.record)?;
        print!("{}", String::from_utf8(bytes)?);
    } else {
        println!(
            "Created {} at {}",
            registration.record.id,
            registration.dir.display()
        );
    }
    Ok(())
}
