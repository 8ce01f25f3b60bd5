use std::path::PathBuf;

/// Errors produced by the access log pipeline.
///
/// Only configuration loading hands these to the caller. Failures on the request path are
/// logged and the affected record is dropped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read configuration file {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ParseConfig(#[source] serde_json::Error),

    #[error("unable to marshal the data, error {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unable to send data to {url}, error {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("unable to get hostname: {0}")]
    Hostname(std::io::Error),
}
