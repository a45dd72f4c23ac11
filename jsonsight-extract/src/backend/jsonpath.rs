//! RFC 9535 JSONPath backend.

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::{ExtractError, Result};
use crate::extractor::Extractor;

/// Evaluates paths such as `$.items[*].name` with `serde_json_path`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathExtractor;

impl Extractor for JsonPathExtractor {
    fn name(&self) -> &'static str {
        "jsonpath"
    }

    fn select(&self, document: &Value, path: &str) -> Result<Vec<Value>> {
        let compiled = JsonPath::parse(path)
            .map_err(|e| ExtractError::parse(format!("invalid JSONPath '{}': {}", path, e)))?;

        Ok(compiled.query(document).all().into_iter().cloned().collect())
    }

    fn select_first(&self, document: &Value, path: &str) -> Result<Option<Value>> {
        let compiled = JsonPath::parse(path)
            .map_err(|e| ExtractError::parse(format!("invalid JSONPath '{}': {}", path, e)))?;

        Ok(compiled.query(document).first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_nodes_in_order() {
        let doc = json!({"items": [{"n": "x"}, {"n": "y"}]});
        let nodes = JsonPathExtractor.select(&doc, "$.items[*].n").unwrap();
        assert_eq!(nodes, vec![json!("x"), json!("y")]);
    }

    #[test]
    fn test_select_nothing() {
        let doc = json!({"a": 1});
        assert!(JsonPathExtractor.select(&doc, "$.b").unwrap().is_empty());
    }

    #[test]
    fn test_filter_expression() {
        let doc = json!({"items": [{"v": 1}, {"v": 7}]});
        let nodes = JsonPathExtractor.select(&doc, "$.items[?@.v > 5].v").unwrap();
        assert_eq!(nodes, vec![json!(7)]);
    }

    #[test]
    fn test_select_first() {
        let doc = json!({"items": [{"n": "x"}, {"n": "y"}]});
        let first = JsonPathExtractor.select_first(&doc, "$.items[*].n").unwrap();
        assert_eq!(first, Some(json!("x")));
        assert_eq!(JsonPathExtractor.select_first(&doc, "$.none").unwrap(), None);
    }

    #[test]
    fn test_invalid_path() {
        let doc = json!({});
        let err = JsonPathExtractor.select(&doc, "$.items[").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }
}
