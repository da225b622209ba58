use std::error::Error;
use std::path::Path;

use clap::Args;
use expman_core::to_pretty_json_bytes;
use expman_registry::record::{read_record_document, record_path};
use expman_registry::Settings;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Experiment id under the root.
    pub id: String,
}

pub fn run(args: &InspectArgs, root: &Path, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let card = record_path(&root.join(&args.id), &settings.id_card_name);
    let document = read_record_document(&card)?;
    print!("{}", String::from_utf8(to_pretty_json_bytes(&document)?)?);
    Ok(())
}
