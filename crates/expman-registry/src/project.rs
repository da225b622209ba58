use serde_json::{Map, Value};
use tracing::debug;

use crate::normalize::Normalizable;

/// Reduced view of a run configuration, keyed as requested by the policy.
pub type ConfigSummary = Map<String, Value>;

/// Looks up a dotted path such as `optimizer.lr` through nested mappings.
pub fn get_by_dot<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Flattens nested mappings into dotted leaf keys, depth-first.
///
/// Lists and scalars are leaves; an empty mapping contributes no keys.
pub fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(map, None, &mut out);
    out
}

fn flatten_into(map: &Map<String, Value>, parent: Option<&str>, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let dotted = match parent {
            Some(parent) => format!("{parent}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) => flatten_into(child, Some(&dotted), out),
            leaf => {
                out.insert(dotted, leaf.clone());
            }
        }
    }
}

/// Normalizes `raw` and keeps only the requested dotted paths.
pub fn project<N: Normalizable + ?Sized>(raw: &N, keep_paths: &[String]) -> ConfigSummary {
    project_plain(raw.to_plain(), keep_paths)
}

/// Projects an already normalized mapping.
///
/// A path that resolves to a non-null value is stored under its dotted key.
/// Otherwise every flattened leaf below `path.` is gathered into a nested
/// mapping keyed by the remaining suffix. Paths with no match are skipped.
pub fn project_plain(plain: Map<String, Value>, keep_paths: &[String]) -> ConfigSummary {
    if keep_paths.is_empty() {
        return plain;
    }
    let mut summary = ConfigSummary::new();
    let mut flat: Option<Map<String, Value>> = None;
    for path in keep_paths {
        if let Some(value) = get_by_dot(&plain, path).filter(|value| !value.is_null()) {
            summary.insert(path.clone(), value.clone());
            continue;
        }
        let flat = flat.get_or_insert_with(|| flatten(&plain));
        let prefix = format!("{path}.");
        let mut direct = None;
        let mut nested = Map::new();
        for (key, value) in flat.iter() {
            if key == path {
                if !value.is_null() {
                    direct = Some(value.clone());
                }
            } else if let Some(suffix) = key.strip_prefix(&prefix) {
                nested.insert(suffix.to_string(), value.clone());
            }
        }
        if let Some(value) = direct {
            summary.insert(path.clone(), value);
        } else if !nested.is_empty() {
            summary.insert(path.clone(), Value::Object(nested));
        } else {
            debug!(path = %path, "keep path not present in config");
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keep(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn exact_leaf_is_stored_under_dotted_key() {
        let config = json!({"optimizer": {"lr": 0.1, "momentum": 0.9}});
        let summary = project(&config, &keep(&["optimizer.lr"]));
        assert_eq!(Value::Object(summary), json!({"optimizer.lr": 0.1}));
    }

    #[test]
    fn exact_mapping_is_stored_whole() {
        let config = json!({"optimizer": {"lr": 0.1, "momentum": 0.9}});
        let summary = project(&config, &keep(&["optimizer"]));
        assert_eq!(
            Value::Object(summary),
            json!({"optimizer": {"lr": 0.1, "momentum": 0.9}})
        );
    }

    #[test]
    fn dotted_literal_keys_fall_back_to_prefix_match() {
        let config = json!({"trainer": {"callbacks.ckpt": {"every": 5, "top_k": 2}}});
        let summary = project(&config, &keep(&["trainer.callbacks"]));
        assert_eq!(
            Value::Object(summary),
            json!({"trainer.callbacks": {"ckpt.every": 5, "ckpt.top_k": 2}})
        );
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        let config = json!({"optimizer": {"lr": 0.1}});
        let summary = project(&config, &keep(&["optim"]));
        assert!(summary.is_empty());
    }

    #[test]
    fn missing_and_null_paths_are_omitted() {
        let config = json!({"seed": null, "data": {"name": "cifar"}});
        let summary = project(&config, &keep(&["seed", "model.depth", "data.name"]));
        assert_eq!(Value::Object(summary), json!({"data.name": "cifar"}));
    }

    #[test]
    fn empty_keep_list_returns_everything() {
        let config = json!({"b": {"c": [1, 2]}, "a": 1});
        let summary = project(&config, &[]);
        assert_eq!(Value::Object(summary), config);
    }

    #[test]
    fn summary_follows_keep_list_order() {
        let config = json!({"a": 1, "b": 2, "c": 3});
        let summary = project(&config, &keep(&["c", "a"]));
        let keys: Vec<&String> = summary.keys().collect();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[test]
    fn flatten_stops_at_lists_and_skips_empty_maps() {
        let flat = flatten(&object(json!({
            "model": {"layers": [64, 64], "head": {"dropout": 0.1}},
            "empty": {},
            "seed": 7
        })));
        assert_eq!(
            Value::Object(flat),
            json!({"model.layers": [64, 64], "model.head.dropout": 0.1, "seed": 7})
        );
    }

    #[test]
    fn get_by_dot_walks_nested_maps_only() {
        let map = object(json!({"a": {"b": {"c": 1}}, "l": [1]}));
        assert_eq!(get_by_dot(&map, "a.b.c"), Some(&json!(1)));
        assert_eq!(get_by_dot(&map, "a.x"), None);
        assert_eq!(get_by_dot(&map, "l.0"), None);
    }
}
