//! Turns a JSON payload into metric samples.

use std::fmt;

use jsonsight_extract::{ExtractError, Extractor};
use tracing::{debug, trace, warn};

use crate::config::MetricDefinition;

/// One sample extracted for a metric definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSample {
    /// The sample value. May be NaN.
    pub value: f64,
    /// Label values, one per label name of the definition.
    pub labels: Vec<String>,
}

/// A sample together with the definition that produced it.
#[derive(Debug, Clone)]
pub struct CollectedSample<'a> {
    pub definition: &'a MetricDefinition,
    pub sample: ExtractedSample,
}

/// An extraction problem that skipped a definition or element, or blanked
/// a sample's labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectWarning {
    /// Name of the metric being collected.
    pub metric: String,
    /// The path that failed.
    pub path: String,
    /// What went wrong.
    pub error: ExtractError,
}

impl fmt::Display for CollectWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.metric, self.path, self.error)
    }
}

/// The result of one collection pass.
#[derive(Debug, Default)]
pub struct Collection<'a> {
    /// Samples in definition order, then element order.
    pub samples: Vec<CollectedSample<'a>>,
    /// Problems that were isolated to one definition or element.
    pub warnings: Vec<CollectWarning>,
}

/// Collects samples for a list of metric definitions.
///
/// Errors never abort the pass: a failing definition or array element is
/// recorded as a warning and collection moves on.
pub struct MetricCollector<'a> {
    definitions: &'a [MetricDefinition],
    extractor: &'a dyn Extractor,
}

impl<'a> MetricCollector<'a> {
    /// Create a collector over `definitions` using `extractor`.
    pub fn new(definitions: &'a [MetricDefinition], extractor: &'a dyn Extractor) -> Self {
        Self {
            definitions,
            extractor,
        }
    }

    /// Collect every definition against `payload`.
    pub fn collect(&self, payload: &[u8]) -> Collection<'a> {
        let mut collection = Collection::default();

        for definition in self.definitions {
            match &definition.object_path {
                None => self.collect_value(definition, payload, &mut collection),
                Some(object_path) => {
                    self.collect_objects(definition, object_path, payload, &mut collection)
                }
            }
        }

        trace!(
            samples = collection.samples.len(),
            warnings = collection.warnings.len(),
            "Collection finished"
        );
        collection
    }

    fn collect_value(
        &self,
        definition: &'a MetricDefinition,
        payload: &[u8],
        collection: &mut Collection<'a>,
    ) {
        let value = match self.extractor.extract_value(payload, &definition.value_path) {
            Ok(value) => value,
            Err(e) if e.is_path_not_found() => {
                debug!(
                    metric = %definition.name,
                    path = %definition.value_path,
                    "Value path not found, skipping metric"
                );
                return;
            }
            Err(e) => {
                collection.warn(definition, &definition.value_path, e);
                return;
            }
        };

        let labels = self.labels(definition, payload, collection);
        collection.samples.push(CollectedSample {
            definition,
            sample: ExtractedSample { value, labels },
        });
    }

    fn collect_objects(
        &self,
        definition: &'a MetricDefinition,
        object_path: &str,
        payload: &[u8],
        collection: &mut Collection<'a>,
    ) {
        let elements = match self.extractor.extract_object(payload, object_path) {
            Ok(elements) => elements,
            Err(e) if e.is_path_not_found() => {
                debug!(
                    metric = %definition.name,
                    path = %object_path,
                    "Object path not found, skipping metric"
                );
                return;
            }
            Err(e) => {
                collection.warn(definition, object_path, e);
                return;
            }
        };

        for element in elements {
            let fragment = match element {
                Ok(fragment) => fragment,
                Err(e) => {
                    collection.warn(definition, object_path, e);
                    continue;
                }
            };

            let value = match self
                .extractor
                .extract_value(&fragment, &definition.value_path)
            {
                Ok(value) => value,
                Err(e) => {
                    collection.warn(definition, &definition.value_path, e);
                    continue;
                }
            };

            let labels = self.labels(definition, &fragment, collection);
            collection.samples.push(CollectedSample {
                definition,
                sample: ExtractedSample { value, labels },
            });
        }
    }

    /// Extract labels, falling back to empty values on failure.
    fn labels(
        &self,
        definition: &MetricDefinition,
        payload: &[u8],
        collection: &mut Collection<'a>,
    ) -> Vec<String> {
        match self
            .extractor
            .extract_labels(payload, &definition.label_paths)
        {
            Ok(labels) => labels,
            Err(e) => {
                let path = definition.label_paths.join(",");
                collection.warn(definition, &path, e);
                vec![String::new(); definition.label_names.len()]
            }
        }
    }
}

impl Collection<'_> {
    fn warn(&mut self, definition: &MetricDefinition, path: &str, error: ExtractError) {
        warn!(
            metric = %definition.name,
            path = %path,
            error = %error,
            "Failed to extract metric"
        );
        self.warnings.push(CollectWarning {
            metric: definition.name.clone(),
            path: path.to_string(),
            error,
        });
    }
}
