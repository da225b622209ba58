use std::error::Error;
use std::path::Path;

use clap::Args;
use expman_registry::{checkpoint_path, CheckpointKind, Settings};

#[derive(Args, Debug)]
pub struct CkptArgs {
    /// Experiment id under the root.
    pub id: String,
    /// `best` (newest) or `last` (a checkpoint named last.*).
    #[arg(long = "type", default_value = "best")]
    pub kind: CheckpointKind,
}

pub fn run(args: &CkptArgs, root: &Path, settings: &Settings) -> Result<(), Box<dyn Error>> {
    match checkpoint_path(root, &args.id, &settings.id_card_name, args.kind)? {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => Err(format!(
            "no checkpoints found for {} in {}",
            args.id,
            root.join(&args.id).display()
        )
        .into()),
    }
}
