//! The extraction contract shared by every query backend.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{JqExtractor, JsonPathExtractor};
use crate::error::{ExtractError, Result};
use crate::iter::ObjectIter;
use crate::sanitize::{parse_float, sanitize};

/// Leading character that marks a string as a path rather than a literal.
pub const PATH_SIGIL: char = '$';

/// Extracts sample values, label values and iterable objects from JSON.
///
/// Backends only implement [`select`](Extractor::select); the value, label
/// and object semantics are provided here so that every backend behaves the
/// same way for the same logical path.
pub trait Extractor: Send + Sync + fmt::Debug {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluate `path` (sigil included) against `document`.
    ///
    /// Returns every selected node in document order. An empty vector means
    /// the path selected nothing.
    fn select(&self, document: &Value, path: &str) -> Result<Vec<Value>>;

    /// Evaluate `path` and return only its first node.
    ///
    /// Nodes after the first are never required to exist or evaluate
    /// cleanly. Backends with lazy output streams override this to stop
    /// after one node.
    fn select_first(&self, document: &Value, path: &str) -> Result<Option<Value>> {
        Ok(self.select(document, path)?.into_iter().next())
    }

    /// Extract a single sample value.
    ///
    /// A `path` without the leading `$` is a static literal and is parsed as
    /// a float directly, without looking at `payload`.
    fn extract_value(&self, payload: &[u8], path: &str) -> Result<f64> {
        if !path.starts_with(PATH_SIGIL) {
            return parse_float(path);
        }

        let document = parse_document(payload)?;
        match self.select_first(&document, path)? {
            Some(node) => sanitize(&node),
            None => Err(ExtractError::not_found(path)),
        }
    }

    /// Extract one label value per path, in order.
    ///
    /// A path that selects nothing (or `null`) yields an empty value.
    fn extract_labels(&self, payload: &[u8], paths: &[String]) -> Result<Vec<String>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let document = parse_document(payload)?;
        paths
            .iter()
            .map(|path| label_value(self, &document, path))
            .collect()
    }

    /// Select an array or object to iterate over.
    ///
    /// An array yields each element, an object yields itself once. A path
    /// that selects several nodes yields each node.
    fn extract_object(&self, payload: &[u8], path: &str) -> Result<ObjectIter> {
        require_sigil(path)?;

        let document = parse_document(payload)?;
        let mut nodes = self.select(&document, path)?;

        match nodes.len() {
            0 => Err(ExtractError::not_found(path)),
            1 => match nodes.pop() {
                Some(Value::Array(elements)) => Ok(ObjectIter::new(elements)),
                Some(object @ Value::Object(_)) => Ok(ObjectIter::once(object)),
                Some(other) => Err(ExtractError::type_error(format!(
                    "path '{}' selected {}, expected an array or object",
                    path,
                    type_name(&other)
                ))),
                None => Err(ExtractError::not_found(path)),
            },
            _ => Ok(ObjectIter::new(nodes)),
        }
    }
}

/// Selects which [`Extractor`] implementation a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// RFC 9535 JSONPath expressions.
    #[default]
    JsonPath,
    /// jq filter programs.
    Jq,
}

impl Backend {
    /// Get the backend name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::JsonPath => "jsonpath",
            Backend::Jq => "jq",
        }
    }

    /// Build the extractor for this backend.
    pub fn extractor(self) -> Arc<dyn Extractor> {
        match self {
            Backend::JsonPath => Arc::new(JsonPathExtractor),
            Backend::Jq => Arc::new(JqExtractor::new()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a raw payload into a JSON document.
pub fn parse_document(payload: &[u8]) -> Result<Value> {
    serde_json::from_slice(payload).map_err(ExtractError::from)
}

fn require_sigil(path: &str) -> Result<()> {
    if path.starts_with(PATH_SIGIL) {
        Ok(())
    } else {
        Err(ExtractError::parse(format!(
            "path '{}' must start with '{}'",
            path, PATH_SIGIL
        )))
    }
}

fn label_value<E: Extractor + ?Sized>(extractor: &E, document: &Value, path: &str) -> Result<String> {
    require_sigil(path)?;

    let node = match extractor.select_first(document, path)? {
        Some(Value::Null) | None => {
            debug!(path, backend = extractor.name(), "Label path not found in json");
            return Ok(String::new());
        }
        Some(node) => node,
    };

    match node {
        Value::String(s) => Ok(s),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(ExtractError::type_error(format!(
                    "label path '{}' selected an array containing {}, expected only strings",
                    path,
                    type_name(&other)
                ))),
            })
            .collect(),
        other => Err(ExtractError::type_error(format!(
            "label path '{}' selected {}, expected a string or an array of strings",
            path,
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
