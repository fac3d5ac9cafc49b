// Reporter module - hands the collected metrics to the monitoring backend
//
// This module is responsible for:
// 1. Prefixing every metric key with the configured metric path
// 2. Rendering values the way the backend expects (floats rounded)
// 3. Writing each metric with its aggregation and rollup policies
// 4. Handling write failures per metric without stopping the report

use async_trait::async_trait;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::metrics::{MetricMap, MetricValue};

/// Errors that can occur while writing a metric
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write metric {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metric writer is unavailable")]
    Poisoned,
}

/// How values within one interval are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)] // only the default is reported
pub enum AggregationType {
    #[default]
    Average,
    Sum,
    Observation,
}

/// How intervals are combined into coarser time buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)] // only the default is reported
pub enum TimeRollupType {
    #[default]
    Average,
    Sum,
    Current,
}

/// How values from several nodes are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)] // only the default is reported
pub enum ClusterRollupType {
    Individual,
    #[default]
    Collective,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregationType::Average => "AVERAGE",
            AggregationType::Sum => "SUM",
            AggregationType::Observation => "OBSERVATION",
        })
    }
}

impl fmt::Display for TimeRollupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeRollupType::Average => "AVERAGE",
            TimeRollupType::Sum => "SUM",
            TimeRollupType::Current => "CURRENT",
        })
    }
}

impl fmt::Display for ClusterRollupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterRollupType::Individual => "INDIVIDUAL",
            ClusterRollupType::Collective => "COLLECTIVE",
        })
    }
}

/// Aggregation and rollup policies attached to a metric
///
/// The default is average / average / collective, which is what every
/// collected metric is reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricPolicy {
    pub aggregation: AggregationType,
    pub time_rollup: TimeRollupType,
    pub cluster_rollup: ClusterRollupType,
}

/// Sink accepting one metric at a time
#[async_trait]
pub trait MetricWriter: Send + Sync {
    async fn print_metric(
        &self,
        path: &str,
        value: &str,
        policy: &MetricPolicy,
    ) -> Result<(), ReportError>;
}

/// Writes metrics as machine-agent lines:
/// `name=<path>,aggregator=<AGG>,time-rollup=<TIME>,cluster-rollup=<CLUSTER>,value=<value>`
///
/// The path is written verbatim. The line protocol has no escaping, so a
/// path containing `,` or a line break produces a line the agent cannot
/// split back into its fields.
pub struct LineMetricWriter<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineMetricWriter<W> {
    pub fn new(out: W) -> Self {
        LineMetricWriter {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> Result<W, ReportError> {
        self.out.into_inner().map_err(|_| ReportError::Poisoned)
    }
}

impl LineMetricWriter<std::io::Stdout> {
    /// Writer used in production; the agent reads metrics from stdout
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> MetricWriter for LineMetricWriter<W> {
    async fn print_metric(
        &self,
        path: &str,
        value: &str,
        policy: &MetricPolicy,
    ) -> Result<(), ReportError> {
        let mut out = self.out.lock().map_err(|_| ReportError::Poisoned)?;
        writeln!(
            out,
            "name={},aggregator={},time-rollup={},cluster-rollup={},value={}",
            path, policy.aggregation, policy.time_rollup, policy.cluster_rollup, value
        )
        .and_then(|()| out.flush())
        .map_err(|source| ReportError::Write {
            path: path.to_string(),
            source,
        })
    }
}

/// Reports a metric map through a `MetricWriter`
pub struct MetricReporter<'a> {
    writer: &'a dyn MetricWriter,

    /// Prepended verbatim to every key
    metric_prefix: &'a str,

    policy: MetricPolicy,
}

impl<'a> MetricReporter<'a> {
    pub fn new(writer: &'a dyn MetricWriter, metric_prefix: &'a str) -> Self {
        MetricReporter {
            writer,
            metric_prefix,
            policy: MetricPolicy::default(),
        }
    }

    /// Writes every metric in `metrics`
    ///
    /// # Returns
    /// Number of metrics written. A metric that fails to write is logged
    /// and skipped; there is no retry.
    pub async fn report(&self, metrics: &MetricMap) -> usize {
        let mut written = 0;

        for (key, value) in metrics {
            let path = format!("{}{}", self.metric_prefix, key);
            if self.report_metric(&path, value).await {
                written += 1;
            }
        }

        info!("Reported {}/{} metric(s)", written, metrics.len());
        written
    }

    async fn report_metric(&self, path: &str, value: &MetricValue) -> bool {
        debug!("Metric [{} = {}]", path, value);

        match self
            .writer
            .print_metric(path, &value.reported(), &self.policy)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to report metric {}: {}", path, e);
                false
            }
        }
    }
}
