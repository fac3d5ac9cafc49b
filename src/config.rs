// Configuration module - handles config file resolution and parsing
//
// This module is responsible for:
// 1. Resolving the config file path handed over by the invoking scheduler
// 2. Reading and parsing the YAML configuration file
// 3. Validating the parsed configuration
// 4. Holding the constants shared by the collector and the reporter

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Separator between the domain and the attribute name in a metric key
pub const METRICS_SEPARATOR: &str = "|";

/// Reserved metric key carrying the overall collection status
pub const METRICS_COLLECTED: &str = "MetricsCollected";

/// Status value reported when the collection pass connected and ran
pub const SUCCESS_VALUE: i64 = 1;

/// Status value reported when the server could not be reached
pub const ERROR_VALUE: i64 = 0;

/// Task argument naming the configuration file
pub const CONFIG_ARG: &str = "config-file";

/// Config path used when the task argument is absent or empty
pub const DEFAULT_CONFIG_PATH: &str = "monitors/MuleESBMonitor/config.yml";

/// Pattern locating the server context object that exposes JVM memory figures
pub const MEMORY_CONTEXT_PATTERN: &str = "Mule.default:name=MuleContext,*";

/// Attributes of the context object reported under their own (unprefixed) names
pub const MEMORY_ATTRIBUTES: [&str; 3] = ["FreeMemory", "MaxMemory", "TotalMemory"];

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file format in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure loaded from the YAML config file
///
/// # Example
/// ```yaml
/// server:
///   host: "localhost"
///   port: 8778
///   username: "admin"
///   password: "secret"
/// mbeans:
///   domainMatcher: "Mule.*"
///   types: ["Application", "Flow"]
///   excludeDomains: ["Mule.agent"]
/// metricPrefix: "Custom Metrics|Mule ESB|"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Management endpoint of the monitored server
    pub server: ServerEndpoint,

    /// Which manageable objects to collect
    pub mbeans: MBeanSelection,

    /// Prepended verbatim to every metric key when reporting
    pub metric_prefix: String,
}

/// Connection details of the monitored server
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Mount point of the Jolokia agent on the server
    #[serde(default = "default_context_path", alias = "context_path")]
    pub context_path: String,

    #[serde(default, alias = "use_ssl")]
    pub use_ssl: bool,

    /// Per-request timeout; the only bound on a hung remote call
    #[serde(default = "default_timeout_secs", alias = "timeout_secs")]
    pub timeout_secs: u64,
}

impl ServerEndpoint {
    /// Creates an endpoint with default transport settings
    #[cfg(test)]
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        ServerEndpoint {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            context_path: default_context_path(),
            use_ssl: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Hand-written so the password never ends up in a log line
impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("context_path", &self.context_path)
            .field("use_ssl", &self.use_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Selection of manageable objects to collect
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MBeanSelection {
    /// Domain part of every query pattern, wildcards allowed (e.g. "Mule.*")
    pub domain_matcher: String,

    /// One query is issued per type name
    pub types: Vec<String>,

    /// Objects in these domains are skipped entirely
    #[serde(default)]
    pub exclude_domains: HashSet<String>,
}

fn default_context_path() -> String {
    "/jolokia".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Configuration {
    /// Reads and validates the configuration file at `path`
    ///
    /// # Returns
    /// * `Ok(Configuration)` - Successfully loaded configuration
    /// * `Err(ConfigError::NotFound)` - No file at `path`
    /// * `Err(ConfigError)` - Unreadable, unparsable or invalid file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from: {}", path.display());

        if !path.is_file() {
            warn!("Config file not found: {}", path.display());
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Configuration =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;

        info!(
            "Loaded configuration: server {}, domain matcher '{}', {} type(s), {} excluded domain(s)",
            config.server,
            config.mbeans.domain_matcher,
            config.mbeans.types.len(),
            config.mbeans.exclude_domains.len()
        );

        Ok(config)
    }

    /// Rejects unusable settings and drops repeated entries from
    /// `mbeans.types`, keeping the first occurrence of each type
    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".to_string()));
        }
        if self.server.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.timeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.mbeans.types.is_empty() {
            return Err(ConfigError::Invalid(
                "mbeans.types must list at least one type".to_string(),
            ));
        }

        let listed = self.mbeans.types.len();
        let mut seen = HashSet::new();
        self.mbeans.types.retain(|t| seen.insert(t.clone()));
        if self.mbeans.types.len() < listed {
            warn!(
                "Ignoring {} duplicate type(s) in mbeans.types",
                listed - self.mbeans.types.len()
            );
        }

        Ok(())
    }
}

/// Resolves the config file argument to a path
///
/// # Resolution
/// 1. Absent or empty argument: the default relative path is used
/// 2. A path that exists as given is used verbatim
/// 3. Anything else is resolved against `base_dir`
///    (the directory holding the running executable)
pub fn resolve_config_path(argument: Option<&str>, base_dir: &Path) -> PathBuf {
    let filename = match argument.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_CONFIG_PATH,
    };

    let verbatim = Path::new(filename);
    if verbatim.exists() {
        return verbatim.to_path_buf();
    }

    base_dir.join(filename)
}

/// Directory containing the running executable, or the working directory
/// when it cannot be determined
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
