use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use expman_registry::record::{record_path, ExperimentRecord};
use expman_registry::{Registrar, Settings};

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Experiment id under the root.
    #[arg(required_unless_present = "dir")]
    pub id: Option<String>,
    /// Experiment directory outside the root.
    #[arg(long, conflicts_with = "id")]
    pub dir: Option<PathBuf>,
    /// Profile to rescan with; defaults to the policy recorded in the id card.
    #[arg(long)]
    pub profile: Option<PathBuf>,
}

pub fn run(args: &RefreshArgs, root: &Path, settings: Settings) -> Result<(), Box<dyn Error>> {
    let dir = match (&args.dir, &args.id) {
        (Some(dir), _) => dir.clone(),
        (None, Some(id)) => root.join(id),
        (None, None) => return Err("an experiment id or --dir is required".into()),
    };
    let registrar = Registrar::from_settings(settings);
    let policy = match &args.profile {
        Some(path) => registrar.load_policy(Some(path))?,
        None => {
            let card = record_path(&dir, &registrar.settings().id_card_name);
            let record = ExperimentRecord::load(&card)?;
            record.profile.to_policy(&record.description)
        }
    };
    let record = registrar.refresh_artifacts(&dir, &policy)?;
    println!(
        "Refreshed {}: {} checkpoint(s){}",
        record.id,
        record.files.checkpoints.len(),
        record
            .files
            .best
            .as_deref()
            .map(|best| format!(", best {best}"))
            .unwrap_or_default()
    );
    Ok(())
}
