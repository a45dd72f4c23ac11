//! Path extraction for the JSONSight exporter.
//!
//! A metric definition names its value, labels and (optionally) the object to
//! iterate as path strings. This crate evaluates those paths against a JSON
//! payload:
//!
//! - [`Extractor`] - the extraction contract (value, labels, object)
//! - [`Backend`] - per-deployment selection between JSONPath and jq
//! - [`ObjectIter`] - lazy cursor over the elements of a selected array
//! - [`sanitize`] - coercion of JSON scalars into sample values
//!
//! # Example
//!
//! ```
//! use jsonsight_extract::Backend;
//!
//! let extractor = Backend::JsonPath.extractor();
//! let value = extractor
//!     .extract_value(br#"{"foo": {"bar": 42}}"#, "$.foo.bar")
//!     .unwrap();
//! assert_eq!(value, 42.0);
//! ```

pub mod backend;
pub mod error;
pub mod extractor;
pub mod iter;
pub mod sanitize;

pub use backend::{JqExtractor, JsonPathExtractor};
pub use error::{ExtractError, Result};
pub use extractor::{Backend, Extractor, PATH_SIGIL, parse_document};
pub use iter::ObjectIter;
pub use sanitize::sanitize;
