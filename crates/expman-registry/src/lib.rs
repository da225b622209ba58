#![deny(missing_docs)]
#![doc = "Experiment identity and id card management: config projection, naming, artifact discovery and atomic record writes."]

/// Artifact discovery inside experiment directories.
pub mod discovery;
/// Environment snapshot and version-control metadata.
pub mod environment;
/// Listing, filtering and checkpoint lookup across an experiment root.
pub mod listing;
/// Experiment directory naming.
pub mod naming;
/// Plain and interpolating config normalization.
pub mod normalize;
/// Naming and selection policy.
pub mod policy;
/// Dotted-path config projection.
pub mod project;
/// Id card schema and atomic persistence.
pub mod record;
/// Registration and refresh of experiment directories.
pub mod registrar;
/// Process-wide defaults sourced from the environment.
pub mod settings;
/// Copying artifacts of an existing run into an experiment directory.
pub mod staging;

pub use discovery::{discover_artifacts, ArtifactIndex};
pub use environment::{
    CommitInfo, CommitInfoProvider, EnvironmentSnapshot, GitCli, HostContext, NoCommitInfo,
};
pub use listing::{
    checkpoint_path, column_names, list_experiments, load_record, parse_filter, CheckpointKind, ExperimentRow,
};
pub use naming::{content_hash, derive_name, EXP_PREFIX};
pub use normalize::{InterpolatedConfig, Normalizable};
pub use policy::{IdMode, Policy, DEFAULT_ID_CARD_NAME};
pub use project::{flatten, get_by_dot, project, ConfigSummary};
pub use record::{ExperimentRecord, PolicyEcho};
pub use registrar::{RegisterOptions, Registrar, Registration};
pub use settings::Settings;
