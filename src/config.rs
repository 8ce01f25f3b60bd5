use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::error::Error;

const DEFAULT_HTTP_TYPE: &str = "cms";
const DEFAULT_HTTP_PRODUCER: &str = "auth";
const DEFAULT_HTTP_TYPE_PREFIX: &str = "raw";

/// Message broker settings.
///
/// A non-empty `endpoint` enables structured record shipping at all, a non-empty `uri` makes the
/// broker reachable as a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StompConfig {
    pub endpoint: String,
    pub uri: String,
}

/// Access log configuration.
///
/// Loaded once at startup and shared read-only, usually as `Arc<Config>`.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_accesslog::Config;
///
/// let config = Config::from_json(r#"{
///     "utc": true,
///     "stomp_config": {"endpoint": "cms-mb:61313", "uri": "/topic/cms.auth"},
///     "logs_http_endpoint": "http://logs.example.com/ingest"
/// }"#).unwrap();
///
/// assert!(config.utc);
/// assert_eq!(config.http_producer(), "auth");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render access line timestamps in UTC instead of local time.
    pub utc: bool,
    /// Verbosity level, values above zero log shipping results.
    pub verbose: i32,
    pub stomp_config: StompConfig,
    /// HTTP log-ingestion endpoint, takes precedence over the broker.
    pub logs_http_endpoint: String,
    pub logs_http_type: String,
    pub logs_http_producer: String,
    pub logs_http_type_prefix: String,
    /// Access log file path
    ///
    /// Special values are an empty string and - (both write to standard output).
    pub log_file: PathBuf,
}

impl Config {
    /// Parse configuration from a JSON document. Missing fields take their default values.
    pub fn from_json(data: &str) -> Result<Self, Error> {
        serde_json::from_str(data).map_err(Error::ParseConfig)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn http_type(&self) -> &str {
        or_default(&self.logs_http_type, DEFAULT_HTTP_TYPE)
    }

    pub fn http_producer(&self) -> &str {
        or_default(&self.logs_http_producer, DEFAULT_HTTP_PRODUCER)
    }

    pub fn http_type_prefix(&self) -> &str {
        or_default(&self.logs_http_type_prefix, DEFAULT_HTTP_TYPE_PREFIX)
    }
}

fn or_default<'a>(value: &'a str, default: &'static str) -> &'a str {
    if value.is_empty() { default } else { value }
}
