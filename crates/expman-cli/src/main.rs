use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{
    ckpt::{self, CkptArgs},
    create::{self, CreateArgs},
    inspect::{self, InspectArgs},
    list::{self, ListArgs},
    refresh::{self, RefreshArgs},
};
use expman_registry::Settings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "expman", version, about = "Organize ML experiment runs into tagged directories")]
struct Cli {
    /// Experiment root; defaults to $EXPMAN_ROOT or ./experiments.
    #[arg(long, global = true)]
    exp_root: Option<PathBuf>,
    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a run as a new experiment and write its id card.
    Create(CreateArgs),
    /// Rescan an experiment directory and update the files section of its id card.
    Refresh(RefreshArgs),
    /// List experiments, optionally filtered by key=value.
    Ls(ListArgs),
    /// Print the path of an experiment's best or last checkpoint.
    Ckpt(CkptArgs),
    /// Print an experiment's id card.
    Inspect(InspectArgs),
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("EXPMAN_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Settings::from_env();
    let root = commands::resolve_root(&settings, cli.exp_root.as_deref());
    let result: Result<(), Box<dyn Error>> = match cli.command {
        Command::Create(args) => create::run(&args, &root, settings),
        Command::Refresh(args) => refresh::run(&args, &root, settings),
        Command::Ls(args) => list::run(&args, &root, &settings),
        Command::Ckpt(args) => ckpt::run(&args, &root, &settings),
        Command::Inspect(args) => inspect::run(&args, &root, &settings),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
