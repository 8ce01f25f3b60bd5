use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Version};

use crate::error::Error;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Posts serialized records to the HTTP log endpoint, best effort.
#[derive(Debug, Clone)]
pub struct HttpLogShipper {
    client: reqwest::Client,
    url: String,
    verbose: i32,
}

impl HttpLogShipper {
    pub fn new(url: impl Into<String>, verbose: i32) -> Self {
        Self::with_client(reqwest::Client::new(), url, verbose)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, verbose: i32) -> Self {
        HttpLogShipper {
            client,
            url: url.into(),
            verbose,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issues a single POST of `body` and reports the response's protocol and status.
    pub async fn post(&self, body: Vec<u8>) -> Result<(Version, StatusCode), Error> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: self.url.clone(),
                source,
            })?;
        Ok((response.version(), response.status()))
    }

    /// Posts `body` and logs the outcome. Failures are not retried.
    pub async fn ship(&self, body: Vec<u8>) {
        match self.post(body).await {
            Ok((version, status)) => {
                if self.verbose > 0 {
                    log::info!("{} {:?} {}", self.url, version, status);
                }
            }
            Err(err) => log::error!("{err}"),
        }
    }
}
