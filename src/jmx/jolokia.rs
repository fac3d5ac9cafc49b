// Jolokia transport - JMX over HTTP/JSON
//
// Every operation is a single POST of a JSON request to the agent URL.
// The agent answers with an envelope carrying its own status code, which
// is checked in addition to the HTTP status.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    AttributeInfo, AttributeValue, JmxError, ManagementConnector, ManagementSession, ObjectName,
};
use crate::config::ServerEndpoint;

/// Opens Jolokia sessions
///
/// Connecting sends a `version` request so that an unreachable server or
/// rejected credentials surface immediately as `JmxError::Connection`.
#[derive(Debug, Default)]
pub struct JolokiaConnector;

impl JolokiaConnector {
    pub fn new() -> Self {
        JolokiaConnector
    }
}

#[async_trait]
impl ManagementConnector for JolokiaConnector {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Box<dyn ManagementSession>, JmxError> {
        let session = JolokiaSession::open(endpoint).await?;
        Ok(Box::new(session))
    }
}

/// Response envelope returned by the agent for every request
#[derive(Debug, Deserialize)]
struct JolokiaEnvelope {
    status: u16,

    #[serde(default)]
    value: Value,

    #[serde(default)]
    error_type: Option<String>,

    #[serde(default)]
    error: Option<String>,
}

impl JolokiaEnvelope {
    fn into_value(self) -> Result<Value, JmxError> {
        if self.status == 200 {
            Ok(self.value)
        } else {
            Err(JmxError::Remote {
                status: self.status,
                error_type: self.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: self.error.unwrap_or_default(),
            })
        }
    }
}

/// A session against one Jolokia agent
pub struct JolokiaSession {
    /// `None` once the session is closed
    client: Option<reqwest::Client>,

    /// Agent URL every request is posted to
    url: String,

    credentials: Option<(String, String)>,
}

impl JolokiaSession {
    /// Builds the HTTP client and probes the agent
    pub async fn open(endpoint: &ServerEndpoint) -> Result<Self, JmxError> {
        let connection_error = |reason: String| JmxError::Connection {
            endpoint: endpoint.to_string(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| connection_error(e.to_string()))?;

        let credentials = if endpoint.username.is_empty() {
            None
        } else {
            Some((endpoint.username.clone(), endpoint.password.clone()))
        };

        let session = JolokiaSession {
            client: Some(client),
            url: agent_url(endpoint),
            credentials,
        };

        info!("Connecting to Jolokia agent at {}", session.url);

        let version = session
            .request(json!({ "type": "version" }))
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        debug!("Jolokia agent version: {}", version);

        Ok(session)
    }

    /// Posts one request and unwraps the response envelope
    async fn request(&self, body: Value) -> Result<Value, JmxError> {
        let client = self.client.as_ref().ok_or(JmxError::Closed)?;

        let mut request = client.post(&self.url).json(&body);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?.error_for_status()?;
        let envelope: JolokiaEnvelope = response.json().await?;
        envelope.into_value()
    }
}

#[async_trait]
impl ManagementSession for JolokiaSession {
    async fn query_names(&self, pattern: &ObjectName) -> Result<Vec<ObjectName>, JmxError> {
        let value = self
            .request(json!({ "type": "search", "mbean": pattern.canonical_name() }))
            .await?;

        let Value::Array(entries) = value else {
            return Err(JmxError::InvalidResponse(format!(
                "search for {} did not return a list",
                pattern
            )));
        };

        let mut names = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(text) = entry.as_str() else {
                warn!("Ignoring non-string search result: {}", entry);
                continue;
            };
            match ObjectName::parse(text) {
                Ok(name) => names.push(name),
                Err(e) => warn!("Ignoring unparsable object name in search result: {}", e),
            }
        }

        debug!("Pattern {} matched {} object(s)", pattern, names.len());
        Ok(names)
    }

    async fn attribute_info(&self, name: &ObjectName) -> Result<Vec<AttributeInfo>, JmxError> {
        let path = format!(
            "{}/{}",
            escape_path_segment(name.domain()),
            escape_path_segment(&name.canonical_key_properties())
        );

        let value = self.request(json!({ "type": "list", "path": path })).await?;

        let Value::Object(info) = value else {
            return Err(JmxError::InvalidResponse(format!(
                "list for {} did not return an object",
                name
            )));
        };

        let attributes = match info.get("attr") {
            Some(Value::Object(attributes)) => attributes
                .iter()
                .map(|(attribute, description)| {
                    let type_name = description
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    AttributeInfo::new(attribute, type_name)
                })
                .collect(),
            Some(other) => {
                return Err(JmxError::InvalidResponse(format!(
                    "attribute list for {} is not an object: {}",
                    name, other
                )))
            }
            None => Vec::new(),
        };

        Ok(attributes)
    }

    async fn read_attribute(
        &self,
        name: &ObjectName,
        attribute: &str,
    ) -> Result<AttributeValue, JmxError> {
        let value = self
            .request(json!({
                "type": "read",
                "mbean": name.canonical_name(),
                "attribute": attribute,
            }))
            .await?;

        Ok(AttributeValue::from_json(value))
    }

    async fn close(&mut self) -> Result<(), JmxError> {
        match self.client.take() {
            Some(_) => {
                debug!("Closed Jolokia session to {}", self.url);
                Ok(())
            }
            None => Err(JmxError::Closed),
        }
    }
}

/// `<scheme>://<host>:<port><context_path>`
fn agent_url(endpoint: &ServerEndpoint) -> String {
    let scheme = if endpoint.use_ssl { "https" } else { "http" };
    let context_path = endpoint.context_path.trim_end_matches('/');
    let separator = if context_path.starts_with('/') || context_path.is_empty() {
        ""
    } else {
        "/"
    };
    format!(
        "{}://{}:{}{}{}",
        scheme, endpoint.host, endpoint.port, separator, context_path
    )
}

/// Escapes `!` and `/` inside one segment of a list path
fn escape_path_segment(segment: &str) -> String {
    segment.replace('!', "!!").replace('/', "!/")
}
