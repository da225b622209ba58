use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use expman_core::errors::{ErrorInfo, ExpError};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::naming::EXP_PREFIX;
use crate::project::flatten;
use crate::record::{record_path, ExperimentRecord};

/// One experiment as shown by `ls`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentRow {
    /// Experiment directory.
    pub dir: PathBuf,
    /// `id`, `created_at`, `description`, `tags`, then flattened summary keys.
    pub columns: Map<String, Value>,
}

impl ExperimentRow {
    fn from_record(dir: PathBuf, record: &ExperimentRecord) -> Self {
        let mut columns = Map::new();
        columns.insert("id".into(), Value::String(record.id.clone()));
        columns.insert("created_at".into(), Value::String(record.created_at.clone()));
        columns.insert(
            "description".into(),
            Value::String(record.description.clone()),
        );
        columns.insert("tags".into(), Value::String(record.tags().join(", ")));
        for (key, value) in flatten(&record.config_summary) {
            columns.entry(key).or_insert(value);
        }
        Self { dir, columns }
    }

    /// Text form of a column; missing columns render empty.
    pub fn cell(&self, column: &str) -> String {
        self.columns.get(column).map(render_value).unwrap_or_default()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Union of column names across rows, in first-seen order.
pub fn column_names(rows: &[ExperimentRow]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.columns.keys() {
            if !names.iter().any(|name| name == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

/// Splits a `key=value` filter.
pub fn parse_filter(raw: &str) -> Result<(String, String), ExpError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ExpError::InvalidConfiguration(
            ErrorInfo::new("listing.filter", format!("malformed filter: {raw}"))
                .with_hint("filters look like key=value"),
        )),
    }
}

/// Lists every `exp_*` child of `root` that carries an id card, sorted by name.
///
/// Unreadable cards are skipped with a warning. A filter only applies when at
/// least one listed row has its column.
pub fn list_experiments(
    root: &Path,
    id_card_name: &str,
    filters: &[(String, String)],
) -> Result<Vec<ExperimentRow>, ExpError> {
    if !root.is_dir() {
        debug!(root = %root.display(), "experiment root does not exist");
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(root).map_err(|err| ExpError::io("listing.scan", root, err))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ExpError::io("listing.scan", root, err))?;
        let is_experiment = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(EXP_PREFIX))
            .unwrap_or(false);
        if is_experiment && entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    let mut rows = Vec::new();
    for dir in dirs {
        let card = record_path(&dir, id_card_name);
        if !card.is_file() {
            continue;
        }
        match ExperimentRecord::load(&card) {
            Ok(record) => rows.push(ExperimentRow::from_record(dir, &record)),
            Err(err) => warn!(path = %card.display(), error = %err, "skipping unreadable id card"),
        }
    }

    for (key, expected) in filters {
        if !rows.iter().any(|row| row.columns.contains_key(key)) {
            debug!(column = %key, "filter column absent from every row; ignored");
            continue;
        }
        rows.retain(|row| {
            row.columns.get(key).map(render_value).as_deref() == Some(expected.as_str())
        });
    }
    Ok(rows)
}

/// Loads the card of experiment `id` under `root`.
pub fn load_record(
    root: &Path,
    id: &str,
    id_card_name: &str,
) -> Result<ExperimentRecord, ExpError> {
    ExperimentRecord::load(&record_path(&root.join(id), id_card_name))
}

/// Which checkpoint `ckpt` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointKind {
    /// The newest checkpoint.
    #[default]
    Best,
    /// A checkpoint named `last.*`, else the newest.
    Last,
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::Best => f.write_str("best"),
            CheckpointKind::Last => f.write_str("last"),
        }
    }
}

impl FromStr for CheckpointKind {
    type Err = ExpError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "best" => Ok(CheckpointKind::Best),
            "last" => Ok(CheckpointKind::Last),
            other => Err(ExpError::InvalidConfiguration(
                ErrorInfo::new(
                    "listing.checkpoint_kind",
                    format!("unknown checkpoint kind: {other}"),
                )
                .with_hint("use best or last"),
            )),
        }
    }
}

/// Resolves a checkpoint of experiment `id`. Paths recorded in the card that
/// no longer exist are ignored; `Ok(None)` means nothing usable is left.
pub fn checkpoint_path(
    root: &Path,
    id: &str,
    id_card_name: &str,
    kind: CheckpointKind,
) -> Result<Option<PathBuf>, ExpError> {
    let record = load_record(root, id, id_card_name)?;
    let existing: Vec<PathBuf> = record
        .files
        .checkpoints
        .iter()
        .map(PathBuf::from)
        .filter(|path| path.is_file())
        .collect();
    let best = record
        .files
        .best
        .as_deref()
        .map(PathBuf::from)
        .filter(|path| path.is_file())
        .or_else(|| existing.first().cloned());
    let found = match kind {
        CheckpointKind::Best => best,
        CheckpointKind::Last => existing
            .iter()
            .find(|path| path.file_stem().and_then(|stem| stem.to_str()) == Some("last"))
            .cloned()
            .or(best),
    };
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_need_a_key() {
        assert_eq!(
            parse_filter("optimizer.lr=0.1").unwrap(),
            ("optimizer.lr".to_string(), "0.1".to_string())
        );
        assert_eq!(parse_filter("note=a=b").unwrap().1, "a=b");
        assert!(parse_filter("novalue").is_err());
        assert!(parse_filter("=x").is_err());
    }

    #[test]
    fn checkpoint_kind_parses() {
        assert_eq!("last".parse::<CheckpointKind>().unwrap(), CheckpointKind::Last);
        assert_eq!(CheckpointKind::default().to_string(), "best");
        assert!("worst".parse::<CheckpointKind>().is_err());
    }

    #[test]
    fn missing_root_lists_nothing() {
        let rows = list_experiments(Path::new("/no/such/root"), "id_card.json", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn column_names_keep_first_seen_order() {
        let mut a = Map::new();
        a.insert("id".into(), Value::from("exp_0001"));
        a.insert("lr".into(), Value::from(0.1));
        let mut b = Map::new();
        b.insert("id".into(), Value::from("exp_0002"));
        b.insert("seed".into(), Value::from(3));
        let rows = vec![
            ExperimentRow { dir: PathBuf::from("a"), columns: a },
            ExperimentRow { dir: PathBuf::from("b"), columns: b },
        ];
        assert_eq!(column_names(&rows), vec!["id", "lr", "seed"]);
        assert_eq!(rows[1].cell("lr"), "");
        assert_eq!(rows[0].cell("lr"), "0.1");
    }
}
