use std::collections::HashMap;

use expman_core::errors::{ErrorInfo, ExpError};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::project::get_by_dot;

const MAX_RESOLVE_DEPTH: usize = 32;
const MAX_RENDERED_LEN: usize = 1 << 20;

/// Anything that can be turned into a plain nested mapping before projection.
pub trait Normalizable {
    /// Returns the plain mapping form. Never fails: unresolvable inputs fall
    /// back to their best-effort unresolved form.
    fn to_plain(&self) -> Map<String, Value>;
}

impl Normalizable for Map<String, Value> {
    fn to_plain(&self) -> Map<String, Value> {
        self.clone()
    }
}

impl Normalizable for Value {
    fn to_plain(&self) -> Map<String, Value> {
        match self {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                debug!(kind = value_kind(other), "config root is not a mapping; using empty config");
                Map::new()
            }
        }
    }
}

/// A config whose string values may reference other values as `${dotted.path}`.
///
/// A string that is exactly one reference takes the referenced value with its
/// type; references embedded in longer strings are rendered as text. Paths are
/// absolute from the config root.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedConfig {
    root: Map<String, Value>,
}

impl InterpolatedConfig {
    /// Wraps a raw config value. Non-mapping roots are treated as empty.
    pub fn new(root: Value) -> Self {
        Self {
            root: root.to_plain(),
        }
    }

    /// Returns the config without resolving any reference.
    pub fn unresolved(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Resolves every reference, failing on missing targets, custom resolvers,
    /// cycles or oversized expansions.
    pub fn resolve(&self) -> Result<Map<String, Value>, ExpError> {
        let mut resolved = HashMap::new();
        let mut out = Map::new();
        for (key, value) in &self.root {
            out.insert(key.clone(), self.resolve_value(value, 0, &mut resolved)?);
        }
        Ok(out)
    }

    fn resolve_value(
        &self,
        value: &Value,
        depth: usize,
        resolved: &mut HashMap<String, Value>,
    ) -> Result<Value, ExpError> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(interpolation_error(
                "interpolation.depth",
                "interpolation nests too deeply (cycle?)",
                None,
            ));
        }
        match value {
            Value::String(text) => self.resolve_string(text, depth, resolved),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, depth, resolved))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.resolve_value(item, depth, resolved)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolved value of the reference `path`, computed once per resolution pass.
    fn resolve_reference(
        &self,
        path: &str,
        depth: usize,
        resolved: &mut HashMap<String, Value>,
    ) -> Result<Value, ExpError> {
        if let Some(value) = resolved.get(path) {
            return Ok(value.clone());
        }
        let value = self.resolve_value(self.lookup(path)?, depth + 1, resolved)?;
        resolved.insert(path.to_string(), value.clone());
        Ok(value)
    }

    fn resolve_string(
        &self,
        text: &str,
        depth: usize,
        resolved: &mut HashMap<String, Value>,
    ) -> Result<Value, ExpError> {
        let references = find_references(text)?;
        if references.is_empty() {
            return Ok(Value::String(text.to_string()));
        }
        if let [only] = references.as_slice() {
            if only.start == 0 && only.end == text.len() {
                return self.resolve_reference(only.path, depth, resolved);
            }
        }
        let mut rendered = String::with_capacity(text.len());
        let mut cursor = 0;
        for reference in &references {
            rendered.push_str(&text[cursor..reference.start]);
            match self.resolve_reference(reference.path, depth, resolved)? {
                Value::String(inner) => rendered.push_str(&inner),
                other => rendered.push_str(&other.to_string()),
            }
            if rendered.len() > MAX_RENDERED_LEN {
                return Err(interpolation_error(
                    "interpolation.too_large",
                    "interpolated string exceeds the expansion limit",
                    Some(text),
                ));
            }
            cursor = reference.end;
        }
        rendered.push_str(&text[cursor..]);
        Ok(Value::String(rendered))
    }

    fn lookup(&self, path: &str) -> Result<&Value, ExpError> {
        if path.contains(':') {
            return Err(interpolation_error(
                "interpolation.resolver",
                "custom resolvers are not supported",
                Some(path),
            ));
        }
        if path.starts_with('.') {
            return Err(interpolation_error(
                "interpolation.relative",
                "relative interpolation is not supported",
                Some(path),
            ));
        }
        get_by_dot(&self.root, path).ok_or_else(|| {
            interpolation_error(
                "interpolation.missing",
                "interpolation target not found",
                Some(path),
            )
        })
    }
}

impl Normalizable for InterpolatedConfig {
    fn to_plain(&self) -> Map<String, Value> {
        match self.resolve() {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "config interpolation failed; keeping unresolved values");
                self.root.clone()
            }
        }
    }
}

#[derive(Debug)]
struct Reference<'a> {
    start: usize,
    end: usize,
    path: &'a str,
}

fn find_references(text: &str) -> Result<Vec<Reference<'_>>, ExpError> {
    let mut references = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find("${") {
        let start = cursor + offset;
        let body = start + 2;
        let Some(close) = text[body..].find('}') else {
            return Err(interpolation_error(
                "interpolation.unterminated",
                "unterminated interpolation",
                Some(text),
            ));
        };
        let end = body + close + 1;
        let path = text[body..end - 1].trim();
        if path.is_empty() || path.contains("${") {
            return Err(interpolation_error(
                "interpolation.syntax",
                "unsupported interpolation syntax",
                Some(text),
            ));
        }
        references.push(Reference { start, end, path });
        cursor = end;
    }
    Ok(references)
}

fn interpolation_error(code: &str, message: &str, subject: Option<&str>) -> ExpError {
    let mut info = ErrorInfo::new(code, message);
    if let Some(subject) = subject {
        info = info.with_context("reference", subject);
    }
    ExpError::InvalidConfiguration(info)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
