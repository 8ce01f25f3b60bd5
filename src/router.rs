//! Sink selection and background dispatch of structured records

use std::sync::Arc;

use time::OffsetDateTime;

use crate::broker::BrokerSink;
use crate::config::Config;
use crate::error::Error;
use crate::record::{HttpRecord, LogRecord};
use crate::shipper::HttpLogShipper;

/// Where a record goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Structured shipping is not configured
    Skip,
    /// Wrapped in an envelope and posted to the HTTP log endpoint
    Http(HttpRecord),
    /// Sent as is to the message broker
    Broker(LogRecord),
}

/// Selects at most one sink for `record`.
///
/// Nothing is shipped unless the broker endpoint is configured. The HTTP log endpoint then wins
/// over the broker URI whenever both are set.
pub fn route(config: &Config, record: LogRecord) -> Route {
    if config.stomp_config.endpoint.is_empty() {
        Route::Skip
    } else if !config.logs_http_endpoint.is_empty() {
        let host = match local_hostname() {
            Ok(host) => host,
            Err(err) => {
                log::warn!("{err}");
                String::new()
            }
        };

        Route::Http(HttpRecord {
            producer: config.http_producer().to_owned(),
            kind: config.http_type().to_owned(),
            type_prefix: config.http_type_prefix().to_owned(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            host,
            data: record,
        })
    } else if !config.stomp_config.uri.is_empty() {
        Route::Broker(record)
    } else {
        Route::Skip
    }
}

fn local_hostname() -> Result<String, Error> {
    hostname::get()
        .map(|host| host.to_string_lossy().into_owned())
        .map_err(Error::Hostname)
}

/// Ships records in the background without ever reporting back to the request.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    http: Option<HttpLogShipper>,
    broker: Option<Arc<dyn BrokerSink>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("http", &self.http)
            .field("broker", &self.broker.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(config: Arc<Config>) -> Self {
        let http = (!config.logs_http_endpoint.is_empty())
            .then(|| HttpLogShipper::new(config.logs_http_endpoint.clone(), config.verbose));
        Dispatcher {
            config,
            http,
            broker: None,
        }
    }

    /// Registers the broker client used for [`Route::Broker`].
    pub fn with_broker(mut self, broker: Arc<dyn BrokerSink>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Replaces the HTTP shipper, e.g. to use a preconfigured `reqwest::Client`.
    pub fn with_http_shipper(mut self, shipper: HttpLogShipper) -> Self {
        self.http = Some(shipper);
        self
    }

    /// Routes `record`, serializes it and spawns the send. Must be called within a Tokio runtime.
    pub fn dispatch(&self, record: LogRecord) {
        match route(&self.config, record) {
            Route::Skip => {}
            Route::Http(envelope) => {
                let Some(shipper) = self.http.clone() else {
                    log::warn!("HTTP log endpoint configured without a shipper, record dropped");
                    return;
                };
                if let Some(data) = serialize(&envelope) {
                    tokio::spawn(async move { shipper.ship(data).await });
                }
            }
            Route::Broker(record) => {
                let Some(broker) = self.broker.clone() else {
                    log::warn!("broker URI configured without a broker client, record dropped");
                    return;
                };
                if let Some(data) = serialize(&record) {
                    tokio::spawn(async move { broker.send(data).await });
                }
            }
        }
    }
}

fn serialize(value: &impl serde::Serialize) -> Option<Vec<u8>> {
    match serde_json::to_vec(value).map_err(Error::from) {
        Ok(data) => Some(data),
        Err(err) => {
            log::error!("{err}");
            None
        }
    }
}
