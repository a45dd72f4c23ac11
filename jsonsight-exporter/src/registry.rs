//! Per-probe sample registry and Prometheus text rendering.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use thiserror::Error;

use crate::collector::{CollectedSample, ExtractedSample};
use crate::config::MetricDefinition;
use crate::mapping::{escape_help, escape_label_value, format_value};

/// Reasons a sample is refused by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("metric {metric} expects {expected} label values, got {actual}")]
    LabelCount {
        metric: String,
        expected: usize,
        actual: usize,
    },
    #[error("metric {metric} already has a sample with labels {labels:?}")]
    Duplicate { metric: String, labels: Vec<String> },
}

struct Family<'a> {
    definition: &'a MetricDefinition,
    samples: Vec<ExtractedSample>,
    seen: HashSet<Vec<String>>,
}

/// Accumulates the samples of one probe, grouped by metric.
///
/// Families render in the order their first sample was registered.
#[derive(Default)]
pub struct SampleRegistry<'a> {
    families: Vec<Family<'a>>,
    index: HashMap<&'a str, usize>,
}

impl<'a> SampleRegistry<'a> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one sample.
    pub fn register(
        &mut self,
        definition: &'a MetricDefinition,
        sample: ExtractedSample,
    ) -> Result<(), RegistryError> {
        if sample.labels.len() != definition.label_names.len() {
            return Err(RegistryError::LabelCount {
                metric: definition.name.clone(),
                expected: definition.label_names.len(),
                actual: sample.labels.len(),
            });
        }

        let slot = match self.index.get(definition.name.as_str()) {
            Some(&slot) => slot,
            None => {
                self.families.push(Family {
                    definition,
                    samples: Vec::new(),
                    seen: HashSet::new(),
                });
                let slot = self.families.len() - 1;
                self.index.insert(definition.name.as_str(), slot);
                slot
            }
        };

        let family = &mut self.families[slot];
        if !family.seen.insert(sample.labels.clone()) {
            return Err(RegistryError::Duplicate {
                metric: definition.name.clone(),
                labels: sample.labels,
            });
        }
        family.samples.push(sample);
        Ok(())
    }

    /// Register a collected sample.
    pub fn register_collected(&mut self, collected: CollectedSample<'a>) -> Result<(), RegistryError> {
        self.register(collected.definition, collected.sample)
    }

    /// Number of registered samples.
    pub fn sample_count(&self) -> usize {
        self.families.iter().map(|f| f.samples.len()).sum()
    }

    /// Render all samples in Prometheus exposition format.
    pub fn render(&self) -> String {
        let mut output = Vec::with_capacity(self.sample_count() * 64);

        for family in &self.families {
            let definition = family.definition;
            writeln!(
                output,
                "# HELP {} {}",
                definition.name,
                escape_help(&definition.help)
            )
            .ok();
            writeln!(output, "# TYPE {} untyped", definition.name).ok();

            for sample in &family.samples {
                writeln!(
                    output,
                    "{}{} {}",
                    definition.name,
                    format_labels(&definition.label_names, &sample.labels),
                    format_value(sample.value)
                )
                .ok();
            }
        }

        String::from_utf8(output).unwrap_or_default()
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(names: &[String], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, labels: &[&str]) -> MetricDefinition {
        MetricDefinition {
            name: name.to_string(),
            help: format!("{} help", name),
            label_names: labels.iter().map(|l| l.to_string()).collect(),
            value_path: "$.v".to_string(),
            object_path: None,
            label_paths: labels.iter().map(|l| format!("$.{}", l)).collect(),
        }
    }

    fn sample(value: f64, labels: &[&str]) -> ExtractedSample {
        ExtractedSample {
            value,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_render_untyped_family() {
        let def = definition("item_value", &["id"]);
        let mut registry = SampleRegistry::new();
        registry.register(&def, sample(1.0, &["a"])).unwrap();
        registry.register(&def, sample(2.5, &["b"])).unwrap();

        let output = registry.render();
        assert_eq!(
            output,
            "# HELP item_value item_value help\n\
             # TYPE item_value untyped\n\
             item_value{id=\"a\"} 1\n\
             item_value{id=\"b\"} 2.5\n"
        );
    }

    #[test]
    fn test_render_without_labels_and_nan() {
        let def = definition("plain", &[]);
        let mut registry = SampleRegistry::new();
        registry.register(&def, sample(f64::NAN, &[])).unwrap();

        assert!(registry.render().contains("plain NaN\n"));
    }

    #[test]
    fn test_label_count_mismatch() {
        let def = definition("m", &["a", "b"]);
        let mut registry = SampleRegistry::new();

        let err = registry.register(&def, sample(1.0, &["x"])).unwrap_err();
        assert_eq!(
            err,
            RegistryError::LabelCount {
                metric: "m".to_string(),
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(registry.sample_count(), 0);
    }

    #[test]
    fn test_duplicate_series_rejected() {
        let def = definition("m", &["a"]);
        let mut registry = SampleRegistry::new();

        registry.register(&def, sample(1.0, &["x"])).unwrap();
        let err = registry.register(&def, sample(2.0, &["x"])).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
        assert_eq!(registry.sample_count(), 1);
    }

    #[test]
    fn test_families_keep_registration_order() {
        let first = definition("zeta", &[]);
        let second = definition("alpha", &[]);
        let mut registry = SampleRegistry::new();
        registry.register(&first, sample(1.0, &[])).unwrap();
        registry.register(&second, sample(2.0, &[])).unwrap();

        let output = registry.render();
        let zeta = output.find("# TYPE zeta").unwrap();
        let alpha = output.find("# TYPE alpha").unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn test_label_values_escaped() {
        let def = definition("m", &["path"]);
        let mut registry = SampleRegistry::new();
        registry
            .register(&def, sample(1.0, &["C:\\dir \"x\""]))
            .unwrap();

        assert!(registry.render().contains(r#"m{path="C:\\dir \"x\""} 1"#));
    }

    #[test]
    fn test_empty_registry_renders_nothing() {
        assert_eq!(SampleRegistry::new().render(), "");
    }
}
