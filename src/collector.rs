// Collector module - one complete collection pass against the server
//
// A pass has three phases and never retries:
// 1. Connect: open a session; on failure record the error status and stop
// 2. Collect: query and extract every configured type, isolating failures
// 3. Finalize: record the success status and close the session
//
// The session is closed on every path once it has been opened.

use tracing::{error, info, warn};

use crate::config::{Configuration, ERROR_VALUE, METRICS_COLLECTED, SUCCESS_VALUE};
use crate::jmx::{ManagementConnector, ManagementSession};
use crate::metrics::extractor::AttributeExtractor;
use crate::metrics::query::query_objects;
use crate::metrics::{MetricMap, MetricValue};

/// How far a collection pass got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Connected and went through every type (some may have failed)
    Collected,

    /// The server could not be reached; only the status key is set
    ConnectionFailed,
}

/// Outcome of one collection pass
#[derive(Debug, Clone)]
pub struct Collection {
    pub status: CollectionStatus,
    pub metrics: MetricMap,
}

/// Drives a collection pass through a management connector
///
/// Holds no state between passes; every call to `collect` opens and
/// closes its own session.
pub struct MetricsCollector<C> {
    connector: C,
}

impl<C: ManagementConnector> MetricsCollector<C> {
    pub fn new(connector: C) -> Self {
        MetricsCollector { connector }
    }

    /// Runs one collection pass
    ///
    /// # Returns
    /// The merged metric map. It always contains `METRICS_COLLECTED`:
    /// `SUCCESS_VALUE` once connected, `ERROR_VALUE` (and nothing else)
    /// when the connection failed.
    pub async fn collect(&self, config: &Configuration) -> Collection {
        info!("Connecting to server {}", config.server);

        let mut session = match self.connector.connect(&config.server).await {
            Ok(session) => session,
            Err(e) => {
                error!("Error connecting to server {}: {}", config.server, e);
                let mut metrics = MetricMap::new();
                metrics.insert(METRICS_COLLECTED.to_string(), MetricValue::from(ERROR_VALUE));
                return Collection {
                    status: CollectionStatus::ConnectionFailed,
                    metrics,
                };
            }
        };

        let mut metrics = Self::collect_types(session.as_ref(), config).await;
        metrics.insert(METRICS_COLLECTED.to_string(), MetricValue::from(SUCCESS_VALUE));

        if let Err(e) = session.close().await {
            warn!("Unable to close the connection: {}", e);
        }

        Collection {
            status: CollectionStatus::Collected,
            metrics,
        }
    }

    /// Queries and extracts every configured type over an open session
    async fn collect_types(session: &dyn ManagementSession, config: &Configuration) -> MetricMap {
        let selection = &config.mbeans;
        let extractor = AttributeExtractor::new(session, &selection.exclude_domains);

        let mut metrics = MetricMap::new();
        let mut failed_types = 0;

        for type_name in &selection.types {
            match query_objects(session, &selection.domain_matcher, type_name).await {
                Ok(objects) => {
                    info!("Type '{}': found {} object(s)", type_name, objects.len());
                    metrics.extend(extractor.extract(&objects).await);
                }
                Err(e) => {
                    failed_types += 1;
                    error!("Error getting objects with type '{}': {}", type_name, e);
                }
            }
        }

        info!(
            "Collection pass complete: {} metric(s), {}/{} type(s) failed",
            metrics.len(),
            failed_types,
            selection.types.len()
        );

        metrics
    }
}
