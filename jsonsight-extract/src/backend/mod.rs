//! Query backends behind the [`Extractor`](crate::Extractor) contract.

mod jq;
mod jsonpath;

pub use jq::JqExtractor;
pub use jsonpath::JsonPathExtractor;
