// Task module - the entry point invoked once per scheduler tick
//
// Resolves and loads the configuration, runs one collection pass and
// reports the result. Only configuration problems and an unreachable
// server fail the task; everything else is logged where it happens.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

use crate::collector::{CollectionStatus, MetricsCollector};
use crate::config::{resolve_config_path, ConfigError, Configuration, CONFIG_ARG};
use crate::jmx::ManagementConnector;
use crate::reporter::{MetricReporter, MetricWriter};

/// Message handed back to the scheduler on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput(pub String);

/// Task failure reported to the invoking scheduler
#[derive(Error, Debug)]
pub enum TaskExecutionError {
    #[error("Metrics collection task completed with failures")]
    Failed,
}

/// Why a run failed; logged, never returned to the scheduler
#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Server unreachable, only the error status was reported")]
    ConnectionFailed,
}

/// Runs one collection task
///
/// # Arguments
/// * `task_args` - Argument bag from the scheduler; `config-file` names the
///   configuration file (absent or empty selects the default path)
/// * `base_dir` - Directory relative config paths are resolved against
/// * `connector` - Opens the management session
/// * `writer` - Receives the reported metrics
pub async fn execute<C: ManagementConnector>(
    task_args: &HashMap<String, String>,
    base_dir: &Path,
    connector: C,
    writer: &dyn MetricWriter,
) -> Result<TaskOutput, TaskExecutionError> {
    info!("Starting the metrics collection task");

    let config_path = resolve_config_path(task_args.get(CONFIG_ARG).map(String::as_str), base_dir);

    match run(&config_path, connector, writer).await {
        Ok(reported) => {
            info!(
                "Completed the metrics collection task successfully ({} metric(s))",
                reported
            );
            Ok(TaskOutput(
                "Metrics collection task executed successfully".to_string(),
            ))
        }
        Err(RunError::Config(ConfigError::NotFound(path))) => {
            error!("Config file not found: {}", path.display());
            Err(TaskExecutionError::Failed)
        }
        Err(e) => {
            error!("Metrics collection failed: {}", e);
            Err(TaskExecutionError::Failed)
        }
    }
}

async fn run<C: ManagementConnector>(
    config_path: &Path,
    connector: C,
    writer: &dyn MetricWriter,
) -> Result<usize, RunError> {
    let config = Configuration::load(config_path)?;

    let collection = MetricsCollector::new(connector).collect(&config).await;

    let reporter = MetricReporter::new(writer, &config.metric_prefix);
    let reported = reporter.report(&collection.metrics).await;

    match collection.status {
        CollectionStatus::Collected => Ok(reported),
        CollectionStatus::ConnectionFailed => Err(RunError::ConnectionFailed),
    }
}
