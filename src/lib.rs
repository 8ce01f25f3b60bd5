//! Actix-web middleware for access logs with structured log forwarding.
//!
//! Every request produces a human-readable access line, prefixed with a timestamp and written to
//! standard output or a log file. When configured, a structured JSON record of the request is
//! shipped in the background to an HTTP log-ingestion endpoint or a message broker. Shipping is
//! best effort: failures are logged through the `log` crate and never reach the client.
//!
//! # Examples:
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_accesslog::{AccessLogger, Config};
//! use structured_logger::{Builder, async_json::new_writer};
//!
//! #[actix_web::main] // or #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     // diagnostics of the logger itself go through the `log` crate
//!     Builder::new()
//!         .with_target_writer("*", new_writer(tokio::io::stdout()))
//!         .init();
//!
//!     let config = Config::from_json(r#"{
//!         "utc": true,
//!         "stomp_config": {"endpoint": "cms-mb:61313"},
//!         "logs_http_endpoint": "http://logs.example.com/ingest"
//!     }"#).unwrap();
//!     let logger = AccessLogger::new(config);
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(logger.clone())
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?;
//!     Ok(())
//! }
//! ```
//!
//! # Access line format
//!
//! ```text
//! [2024-05-29 10:53:19.25 +0000 UTC] [client: cmsweb.cern.ch] [backend: 10.0.0.1:54321] GET /status HTTP/1.1 200 [data: 0 in 17 out] [auth: TLS13 TLS_AES_128_GCM_SHA256 "/DC=ch/CN=user" X509Cert] [ref: "-" "curl/8.0"] [req: 1.5ms resp: 1ms]
//! ```
//!
//! # Shipping rules
//!
//! - nothing is shipped while `stomp_config.endpoint` is empty
//! - a non-empty `logs_http_endpoint` posts an [`HttpRecord`] envelope, even if a broker is set
//! - otherwise a non-empty `stomp_config.uri` sends the bare [`LogRecord`] to the [`BrokerSink`]
//!
//! # TLS labels
//!
//! Requests are labelled with the negotiated protocol and cipher suite when a [`TlsInfo`] is
//! available as connection data:
//!
//! ```rust,ignore
//! HttpServer::new(app)
//!     .on_connect(|conn, data| {
//!         if let Some(tls) = conn.downcast_ref::<TlsStream<TcpStream>>() {
//!             if let Some(info) = TlsInfo::from_connection(tls.get_ref().1) {
//!                 data.insert(info);
//!             }
//!         }
//!     })
//! ```
//!
//! Plaintext requests are logged as `No TLS None`.
//!
//! # Authentication
//!
//! The authentication method is taken from an [`AuthMethod`] request extension, falling back to
//! the `Cms-Authn-Method` request header. The client certificate comes from `Cms-Auth-Cert`.

mod broker;
mod config;
mod error;
mod logger;
mod record;
mod router;
mod shipper;
mod timestamp;
mod tls;
mod writer;

pub use crate::broker::BrokerSink;
pub use crate::config::{Config, StompConfig};
pub use crate::error::Error;
pub use crate::logger::{AccessLogger, AccessLoggerMiddlewareService, AccessLoggerResponse};
pub use crate::record::{
    AuthMethod, HttpRecord, LogRecord, RequestMeta, ResponseMeta, access_line,
};
pub use crate::router::{Dispatcher, Route, route};
pub use crate::shipper::HttpLogShipper;
pub use crate::timestamp::{format_timestamp, timestamp};
pub use crate::tls::{TlsInfo, TlsLabels};
pub use crate::writer::{SharedWriter, TimestampWriter, open_log_sink};
