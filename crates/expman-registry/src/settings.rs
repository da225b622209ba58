use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::policy::DEFAULT_ID_CARD_NAME;

/// Variable naming the default experiment root.
pub const ROOT_VAR: &str = "EXPMAN_ROOT";
/// Variable naming the default profile file.
pub const PROFILE_VAR: &str = "EXPMAN_PROFILE";
/// Variable overriding the id card file name.
pub const ID_CARD_VAR: &str = "EXPMAN_ID_CARD";

const DEFAULT_ROOT: &str = "experiments";

/// Process-wide defaults, resolved once and passed to the registrar and CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Experiment root used when none is given explicitly.
    pub exp_root: PathBuf,
    /// Profile file used when none is given explicitly.
    pub profile: Option<PathBuf>,
    /// Id card file name used by listing and lookup.
    pub id_card_name: String,
    home: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exp_root: PathBuf::from(DEFAULT_ROOT),
            profile: None,
            id_card_name: DEFAULT_ID_CARD_NAME.to_string(),
            home: None,
        }
    }
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Builds settings from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        let mut settings = Settings {
            home: vars.get("HOME").map(PathBuf::from),
            ..Settings::default()
        };
        if let Some(root) = vars.get(ROOT_VAR) {
            settings.exp_root = settings.expand(root);
        }
        settings.profile = vars.get(PROFILE_VAR).map(|path| settings.expand(path));
        if let Some(name) = vars.get(ID_CARD_VAR) {
            settings.id_card_name = name.trim().to_string();
        }
        settings
    }

    /// Expands a leading `~` against the home directory seen at construction.
    pub fn expand(&self, raw: &str) -> PathBuf {
        let home = match &self.home {
            Some(home) => home,
            None => return PathBuf::from(raw),
        };
        if raw == "~" {
            return home.clone();
        }
        match raw.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => PathBuf::from(raw),
        }
    }
}
