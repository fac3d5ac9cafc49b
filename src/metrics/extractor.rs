// Attribute extractor - turns discovered objects into metric entries
//
// Every readable numeric attribute of every non-excluded object becomes
// one `<domain>|<attribute>` entry. Non-numeric attributes are skipped,
// and any failure on one object only loses that object's entries.

use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{metric_key, MetricMap, MetricValue};
use crate::config::{MEMORY_ATTRIBUTES, MEMORY_CONTEXT_PATTERN};
use crate::jmx::{JmxError, ManagementSession, ObjectName};

/// Reasons the synthetic memory metrics could not be read
#[derive(Error, Debug)]
pub enum MemoryMetricsError {
    #[error("no object matches {0}")]
    ContextNotFound(String),

    #[error("attribute {0} is not numeric")]
    NotNumeric(String),

    #[error(transparent)]
    Jmx(#[from] JmxError),
}

/// Reads metrics from objects over an open session
pub struct AttributeExtractor<'a> {
    session: &'a dyn ManagementSession,

    /// Objects in these domains are skipped without any remote call
    exclude_domains: &'a HashSet<String>,
}

impl<'a> AttributeExtractor<'a> {
    pub fn new(session: &'a dyn ManagementSession, exclude_domains: &'a HashSet<String>) -> Self {
        AttributeExtractor {
            session,
            exclude_domains,
        }
    }

    /// Extracts the metrics of all `objects`, plus the memory metrics of
    /// the server context object when it can be found
    ///
    /// Never fails: per-object errors are logged and the object contributes
    /// nothing.
    pub async fn extract(&self, objects: &BTreeSet<ObjectName>) -> MetricMap {
        let mut metrics = self.memory_metrics().await;

        for name in objects {
            if self.is_domain_excluded(name) {
                info!("Excluding domain: {} as configured", name.domain());
                continue;
            }

            match self.extract_object(name).await {
                Ok(object_metrics) => {
                    debug!("Extracted {} metric(s) from {}", object_metrics.len(), name);
                    metrics.extend(object_metrics);
                }
                Err(e) => error!("Unable to get info for object {}: {}", name, e),
            }
        }

        metrics
    }

    pub fn is_domain_excluded(&self, name: &ObjectName) -> bool {
        self.exclude_domains.contains(name.domain())
    }

    /// Introspects one object and reads each of its attributes
    ///
    /// # Errors
    /// Fails as a whole if introspection or any attribute read fails, so a
    /// half-read object never leaks partial entries.
    pub async fn extract_object(&self, name: &ObjectName) -> Result<MetricMap, JmxError> {
        let attributes = self.session.attribute_info(name).await?;
        let mut metrics = MetricMap::with_capacity(attributes.len());

        for attribute in attributes {
            let value = self.session.read_attribute(name, &attribute.name).await?;
            let key = metric_key(name.domain(), &attribute.name);

            match MetricValue::from_attribute(&value) {
                Some(metric) => {
                    metrics.insert(key, metric);
                }
                None => info!(
                    "Excluded {} ({}) as its value can not be converted to number",
                    key, attribute.type_name
                ),
            }
        }

        Ok(metrics)
    }

    /// FreeMemory, MaxMemory and TotalMemory of the server context object,
    /// or nothing at all if any of them cannot be read
    pub async fn memory_metrics(&self) -> MetricMap {
        match self.read_memory_metrics().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Unable to get memory stats: {}", e);
                MetricMap::new()
            }
        }
    }

    async fn read_memory_metrics(&self) -> Result<MetricMap, MemoryMetricsError> {
        let pattern = ObjectName::parse(MEMORY_CONTEXT_PATTERN)?;
        let context = self
            .session
            .query_names(&pattern)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryMetricsError::ContextNotFound(pattern.to_string()))?;

        let mut metrics = MetricMap::with_capacity(MEMORY_ATTRIBUTES.len());
        for attribute in MEMORY_ATTRIBUTES {
            let value = self.session.read_attribute(&context, attribute).await?;
            let metric = MetricValue::from_attribute(&value)
                .ok_or_else(|| MemoryMetricsError::NotNumeric(attribute.to_string()))?;
            metrics.insert(attribute.to_string(), metric);
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerEndpoint;
    use crate::jmx::testing::FakeServer;
    use crate::jmx::{AttributeValue, ManagementConnector};
    use serde_json::json;

    const CONTEXT: &str = "Mule.default:name=MuleContext,type=Context";

    fn endpoint() -> ServerEndpoint {
        ServerEndpoint::new("localhost", 8778, "", "")
    }

    fn names(texts: &[&str]) -> BTreeSet<ObjectName> {
        texts.iter().map(|t| ObjectName::parse(t).unwrap()).collect()
    }

    fn with_context(server: FakeServer) -> FakeServer {
        server.with_object(
            CONTEXT,
            &[
                ("FreeMemory", AttributeValue::Integer(100)),
                ("MaxMemory", AttributeValue::Integer(400)),
                ("TotalMemory", AttributeValue::Float(300.0)),
            ],
        )
    }

    #[tokio::test]
    async fn test_numeric_attributes_only() {
        let server = FakeServer::new().with_object(
            "Mule.default:type=Flow,name=orders",
            &[
                ("Count", AttributeValue::Integer(5)),
                ("Ratio", AttributeValue::Float(2.5)),
                ("Name", AttributeValue::Other(json!("orders"))),
                ("Enabled", AttributeValue::Other(json!(true))),
            ],
        );
        let session = server.connect(&endpoint()).await.unwrap();
        let excluded = HashSet::new();
        let extractor = AttributeExtractor::new(session.as_ref(), &excluded);

        let metrics = extractor
            .extract(&names(&["Mule.default:type=Flow,name=orders"]))
            .await;

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics["Mule.default|Count"], MetricValue::Integer(5));
        assert_eq!(metrics["Mule.default|Ratio"], MetricValue::Float(2.5));
    }

    #[tokio::test]
    async fn test_excluded_domain_is_never_read() {
        let server = FakeServer::new()
            .with_object("Mule.agent:type=Flow,name=a", &[("Count", AttributeValue::Integer(1))])
            .with_object("Mule.app:type=Flow,name=b", &[("Count", AttributeValue::Integer(2))]);
        let session = server.connect(&endpoint()).await.unwrap();
        let excluded: HashSet<String> = ["Mule.agent".to_string()].into();
        let extractor = AttributeExtractor::new(session.as_ref(), &excluded);

        let metrics = extractor
            .extract(&names(&["Mule.agent:type=Flow,name=a", "Mule.app:type=Flow,name=b"]))
            .await;

        assert!(metrics.keys().all(|key| !key.starts_with("Mule.agent|")));
        assert_eq!(metrics["Mule.app|Count"], MetricValue::Integer(2));
        assert_eq!(server.calls().introspections, 1);
    }

    #[tokio::test]
    async fn test_failing_object_is_isolated() {
        let server = FakeServer::new()
            .with_object("Mule.a:type=Flow,name=x", &[("Count", AttributeValue::Integer(1))])
            .with_object(
                "Mule.b:type=Flow,name=y",
                &[
                    ("Count", AttributeValue::Integer(2)),
                    ("Broken", AttributeValue::Integer(3)),
                ],
            )
            .with_object("Mule.c:type=Flow,name=z", &[("Count", AttributeValue::Integer(4))])
            .broken_object("Mule.a:type=Flow,name=x")
            .unreadable_attribute("Mule.b:type=Flow,name=y", "Broken");
        let session = server.connect(&endpoint()).await.unwrap();
        let excluded = HashSet::new();
        let extractor = AttributeExtractor::new(session.as_ref(), &excluded);

        let metrics = extractor
            .extract(&names(&[
                "Mule.a:type=Flow,name=x",
                "Mule.b:type=Flow,name=y",
                "Mule.c:type=Flow,name=z",
            ]))
            .await;

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["Mule.c|Count"], MetricValue::Integer(4));
    }

    #[tokio::test]
    async fn test_memory_metrics_from_context() {
        let server = with_context(FakeServer::new());
        let session = server.connect(&endpoint()).await.unwrap();
        let excluded = HashSet::new();
        let extractor = AttributeExtractor::new(session.as_ref(), &excluded);

        let metrics = extractor.extract(&BTreeSet::new()).await;

        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics["FreeMemory"], MetricValue::Integer(100));
        assert_eq!(metrics["MaxMemory"], MetricValue::Integer(400));
        assert_eq!(metrics["TotalMemory"], MetricValue::Float(300.0));
    }

    #[tokio::test]
    async fn test_memory_metrics_all_or_nothing() {
        let server = FakeServer::new().with_object(
            CONTEXT,
            &[
                ("FreeMemory", AttributeValue::Integer(100)),
                ("MaxMemory", AttributeValue::Other(json!("n/a"))),
                ("TotalMemory", AttributeValue::Integer(300)),
            ],
        );
        let session = server.connect(&endpoint()).await.unwrap();
        let excluded = HashSet::new();
        let extractor = AttributeExtractor::new(session.as_ref(), &excluded);

        assert!(extractor.memory_metrics().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_context_is_not_fatal() {
        let server = FakeServer::new();
        let session = server.connect(&endpoint()).await.unwrap();
        let excluded = HashSet::new();
        let extractor = AttributeExtractor::new(session.as_ref(), &excluded);

        assert!(extractor.memory_metrics().await.is_empty());
    }
}
