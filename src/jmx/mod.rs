// JMX module - the remote management protocol seam
//
// The collection pipeline only talks to these traits. The production
// implementation reaches the server's MBeans through a Jolokia agent
// (JMX over HTTP/JSON); tests plug in an in-memory fake.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ServerEndpoint;

pub mod jolokia;
pub mod object_name;
#[cfg(test)]
pub mod testing;

pub use object_name::ObjectName;

/// Errors raised by the management protocol
#[derive(Error, Debug)]
pub enum JmxError {
    /// The server could not be reached or refused the session
    #[error("Cannot connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Malformed object name '{name}': {reason}")]
    MalformedObjectName { name: String, reason: String },

    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote error {status} ({error_type}): {message}")]
    Remote {
        status: u16,
        error_type: String,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session already closed")]
    Closed,
}

/// Introspected description of one attribute of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,

    /// Type as declared by the server (e.g. "long", "java.lang.String")
    pub type_name: String,
}

impl AttributeInfo {
    pub fn new(name: &str, type_name: &str) -> Self {
        AttributeInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// Runtime value of an attribute, classified into a closed set
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Float(f64),
    /// Anything non-numeric; never reported
    Other(serde_json::Value),
}

impl AttributeValue {
    /// Classifies a JSON value read from the server
    ///
    /// Integers that fit in an `i64` stay integral; every other JSON number
    /// (fractions, exponents, huge unsigned values) becomes `Float`.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(number) => {
                if let Some(i) = number.as_i64() {
                    AttributeValue::Integer(i)
                } else if let Some(f) = number.as_f64() {
                    AttributeValue::Float(f)
                } else {
                    AttributeValue::Other(serde_json::Value::Number(number))
                }
            }
            other => AttributeValue::Other(other),
        }
    }
}

/// Opens sessions against a management endpoint
#[async_trait]
pub trait ManagementConnector: Send + Sync {
    /// Opens a session, failing fast with `JmxError::Connection`
    /// when the server is unreachable. No retries.
    async fn connect(&self, endpoint: &ServerEndpoint)
        -> Result<Box<dyn ManagementSession>, JmxError>;
}

/// An open session with the monitored server
///
/// Every call blocks the run until the server answers or the transport
/// times out. `close` must be called exactly once per session.
#[async_trait]
pub trait ManagementSession: Send + Sync {
    /// Returns the names of all objects matching `pattern`
    async fn query_names(&self, pattern: &ObjectName) -> Result<Vec<ObjectName>, JmxError>;

    /// Lists the attributes the object exposes
    async fn attribute_info(&self, name: &ObjectName) -> Result<Vec<AttributeInfo>, JmxError>;

    /// Reads the current value of one attribute
    async fn read_attribute(
        &self,
        name: &ObjectName,
        attribute: &str,
    ) -> Result<AttributeValue, JmxError>;

    /// Releases the session
    async fn close(&mut self) -> Result<(), JmxError>;
}
