use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::{error::GraphError, field_spec::FieldSpec, message::Message};

/// The samples collected for one field over one input file.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    #[serde(flatten)]
    pub spec: FieldSpec,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    fn new(spec: FieldSpec) -> Self {
        Self {
            spec,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Collects `(timestamp, value)` samples for every configured field.
///
/// Series are keyed by the field's label; `order` keeps the command line order
/// for legends and colours, `by_type` routes a message to the labels that read it.
#[derive(Debug, Default)]
pub struct SeriesAccumulator {
    series: HashMap<String, Series>,
    order: Vec<String>,
    by_type: HashMap<String, Vec<String>>,
}

impl SeriesAccumulator {
    pub fn new(specs: impl IntoIterator<Item = FieldSpec>) -> Self {
        let mut acc = Self::default();

        for spec in specs {
            let label = spec.label().to_string();
            if acc.series.contains_key(&label) {
                log::warn!("Field {} given more than once, graphing it once", label);
                continue;
            }

            acc.by_type
                .entry(spec.message_type.clone())
                .or_default()
                .push(label.clone());
            acc.order.push(label.clone());
            acc.series.insert(label, Series::new(spec));
        }

        acc
    }

    /// Message types that feed at least one series.
    pub fn message_types(&self) -> BTreeSet<String> {
        self.by_type.keys().cloned().collect()
    }

    pub fn accept(&mut self, timestamp: f64, message: &Message) -> Result<(), GraphError> {
        let Some(labels) = self.by_type.get(message.msg_type()) else {
            return Ok(());
        };

        for label in labels {
            // every label in by_type has a series
            let Some(series) = self.series.get_mut(label) else {
                continue;
            };
            let spec = &series.spec;

            let value = match message.get(&spec.field_name) {
                None => {
                    return Err(GraphError::MissingField {
                        message_type: spec.message_type.clone(),
                        field: spec.field_name.clone(),
                    })
                }
                Some(Value::Null) => {
                    log::debug!("{} is not finite at t={}, skipping", label, timestamp);
                    continue;
                }
                Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
                Some(other) => {
                    return Err(GraphError::NonNumericField {
                        message_type: spec.message_type.clone(),
                        field: spec.field_name.clone(),
                        value: other.to_string(),
                    })
                }
            };

            series.points.push((timestamp, value * spec.multiplier));
        }

        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Series> {
        self.series.get(label)
    }

    /// All series in the order their fields were given.
    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.order.iter().filter_map(|label| self.series.get(label))
    }

    pub fn labels(&self) -> &[String] {
        &self.order
    }

    pub fn total_points(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }

    /// Drops every sample but keeps the field configuration.
    pub fn clear(&mut self) {
        for series in self.series.values_mut() {
            series.points.clear();
        }
    }
}
