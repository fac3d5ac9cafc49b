// Metrics module - the flat metric map produced by one collection pass
//
// Keys are `<domain>|<attribute>` (or a fixed literal for the synthetic
// memory figures and the status key); values are integral or floating
// point numbers as read from the server.

use std::collections::HashMap;
use std::fmt;

use crate::config::METRICS_SEPARATOR;
use crate::jmx::AttributeValue;

pub mod extractor;
pub mod query;

/// Metric key to value, last write wins
pub type MetricMap = HashMap<String, MetricValue>;

/// A numeric metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    /// Keeps numeric attribute values, drops everything else
    pub fn from_attribute(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(i) => Some(MetricValue::Integer(*i)),
            AttributeValue::Float(f) => Some(MetricValue::Float(*f)),
            AttributeValue::Other(_) => None,
        }
    }

    /// Value as written to the monitoring backend
    ///
    /// Floats are rounded half up (`floor(x + 0.5)`, NaN becomes 0),
    /// integers are written unchanged.
    pub fn reported(&self) -> String {
        match self {
            MetricValue::Integer(i) => i.to_string(),
            MetricValue::Float(f) => round_half_up(*f).to_string(),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(i) => write!(f, "{}", i),
            MetricValue::Float(x) => write!(f, "{}", x),
        }
    }
}

fn round_half_up(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    let floor = value.floor();
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    // `as` saturates at the i64 bounds
    rounded as i64
}

/// Builds the metric key for an attribute of an object in `domain`
///
/// The separator is not escaped: a domain or attribute containing `|`
/// yields an ambiguous key. Neither is `,`, which the metric line format
/// uses between fields (see `LineMetricWriter`).
pub fn metric_key(domain: &str, attribute: &str) -> String {
    format!("{}{}{}", domain, METRICS_SEPARATOR, attribute)
}
