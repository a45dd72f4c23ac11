//! Coercion of extracted JSON scalars into sample values.
//!
//! The rules are fixed and shared by every backend:
//!
//! | JSON value | sample |
//! |------------|--------|
//! | number | its value |
//! | string | surrounding quotes dropped, then parsed as a float |
//! | `null` | NaN |
//! | `true` / `false` | 1.0 / 0.0 |
//! | array, object | [`ExtractError::Type`] |

use serde_json::Value;

use crate::error::{ExtractError, Result};

/// Convert one extracted JSON value into a float.
pub fn sanitize(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExtractError::parse(format!("number {} is not representable", n))),
        Value::String(s) => parse_float(unquote(s)),
        Value::Null => Ok(f64::NAN),
        Value::Bool(true) => Ok(1.0),
        Value::Bool(false) => Ok(0.0),
        Value::Array(_) => Err(ExtractError::type_error(
            "cannot use an array as a sample value",
        )),
        Value::Object(_) => Err(ExtractError::type_error(
            "cannot use an object as a sample value",
        )),
    }
}

/// Parse text as a float.
pub fn parse_float(text: &str) -> Result<f64> {
    text.parse::<f64>().map_err(|e| {
        ExtractError::parse(format!(
            "failed to parse value as float; value: {:?}; err: {}",
            text, e
        ))
    })
}

/// Drop one pair of matching surrounding quotes, if present.
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && matches!(first, b'"' | b'\'' | b'`') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_numbers() {
        assert_eq!(sanitize(&json!(42)).unwrap(), 42.0);
        assert_eq!(sanitize(&json!(-1.5)).unwrap(), -1.5);
        assert_eq!(sanitize(&json!(1e3)).unwrap(), 1000.0);
        assert_eq!(sanitize(&json!(u64::MAX)).unwrap(), u64::MAX as f64);
    }

    #[test]
    fn test_sanitize_strings() {
        assert_eq!(sanitize(&json!("3.25")).unwrap(), 3.25);
        assert_eq!(sanitize(&json!("\"3.25\"")).unwrap(), 3.25);
        assert_eq!(sanitize(&json!("'7'")).unwrap(), 7.0);
        assert!(sanitize(&json!("NaN")).unwrap().is_nan());
    }

    #[test]
    fn test_sanitize_unparseable_string() {
        let err = sanitize(&json!("fast")).unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
        assert!(err.to_string().contains("fast"));
    }

    #[test]
    fn test_sanitize_null_and_bool() {
        assert!(sanitize(&Value::Null).unwrap().is_nan());
        assert_eq!(sanitize(&json!(true)).unwrap(), 1.0);
        assert_eq!(sanitize(&json!(false)).unwrap(), 0.0);
    }

    #[test]
    fn test_sanitize_containers_are_type_errors() {
        assert!(matches!(
            sanitize(&json!([1, 2])),
            Err(ExtractError::Type(_))
        ));
        assert!(matches!(
            sanitize(&json!({"a": 1})),
            Err(ExtractError::Type(_))
        ));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("abc"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote(""), "");
    }
}
