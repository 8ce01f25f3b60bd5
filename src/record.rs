use std::fmt::Write as _;

use actix_web::HttpMessage;
use actix_web::HttpRequest;
use actix_web::http::{Method, StatusCode};
use actix_web::http::header::{self, HeaderMap};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::tls::{TlsInfo, TlsLabels};

const CMS_AUTH_CERT: &str = "cms-auth-cert";
const CMS_AUTHN_METHOD: &str = "cms-authn-method";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const RESPONSE_TIME: &str = "response-time";
const RESPONSE_TIME_SECONDS: &str = "response-time-seconds";
const RESPONSE_STATUS: &str = "response-status";

/// Authentication method resolved by the authentication layer.
///
/// Insert it into the request extensions to override the `Cms-Authn-Method` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMethod(pub String);

/// Structured record of one completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub method: String,
    pub uri: String,
    pub proto: String,
    pub status: i64,
    /// Request body length, -1 if unknown
    pub content_length: i64,
    pub auth_proto: String,
    pub cipher: String,
    pub cms_auth_cert: String,
    pub cms_auth: String,
    pub referer: String,
    pub user_agent: String,
    pub x_forwarded_host: String,
    pub remote_addr: String,
    /// Opaque `Response-Status` header reported by the backend
    pub response_status: String,
    /// Backend response time in seconds, 0 if not reported
    pub response_time: f64,
    /// Locally measured request time in seconds
    pub request_time: f64,
}

/// Envelope around a [`LogRecord`] for the HTTP log endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRecord {
    pub producer: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub type_prefix: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub host: String,
    pub data: LogRecord,
}

/// Request data captured before the request is handed to the wrapped service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub method: String,
    pub uri: String,
    pub proto: String,
    pub content_length: i64,
    pub tls: TlsLabels,
    pub auth_cert: String,
    pub auth_method: String,
    pub referer: String,
    pub user_agent: String,
    pub forwarded_host: String,
    pub remote_addr: String,
}

impl RequestMeta {
    pub fn from_request(req: &HttpRequest) -> Self {
        let headers = req.headers();

        let tls = match req.conn_data::<TlsInfo>() {
            Some(tls) => Some(*tls),
            None => req.extensions().get::<TlsInfo>().copied(),
        };

        let auth_method =
            auth_override(req).unwrap_or_else(|| header_value(headers, CMS_AUTHN_METHOD));

        let referer = match header_value(headers, header::REFERER.as_str()) {
            referer if referer.is_empty() => "-".to_owned(),
            referer => referer,
        };

        let version = match req.version() {
            actix_http::Version::HTTP_09 => "HTTP/0.9",
            actix_http::Version::HTTP_10 => "HTTP/1.0",
            actix_http::Version::HTTP_11 => "HTTP/1.1",
            actix_http::Version::HTTP_2 => "HTTP/2.0",
            actix_http::Version::HTTP_3 => "HTTP/3.0",
            _ => "unknown",
        };

        RequestMeta {
            method: req.method().to_string(),
            uri: req
                .uri()
                .path_and_query()
                .map(|p| p.as_str())
                .unwrap_or("/")
                .to_owned(),
            proto: version.to_owned(),
            content_length: content_length(req),
            tls: TlsLabels::inspect(tls.as_ref()),
            auth_cert: header_value(headers, CMS_AUTH_CERT),
            auth_method,
            referer,
            user_agent: header_value(headers, header::USER_AGENT.as_str()),
            forwarded_host: header_value(headers, X_FORWARDED_HOST),
            remote_addr: req
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default(),
        }
    }

    /// Picks up an [`AuthMethod`] the wrapped service stored while handling the request.
    pub fn resolve_auth_method(&mut self, req: &HttpRequest) {
        if let Some(method) = auth_override(req) {
            self.auth_method = method;
        }
    }
}

fn auth_override(req: &HttpRequest) -> Option<String> {
    req.extensions()
        .get::<AuthMethod>()
        .map(|method| method.0.clone())
        .filter(|method| !method.is_empty())
}

/// Response data reported by the wrapped service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    pub status: u16,
    /// `Content-Length` response header, empty if absent
    pub content_length: String,
    /// `Response-Time` response header, passed through verbatim
    pub response_time: String,
    pub response_time_seconds: f64,
    pub response_status: String,
}

impl ResponseMeta {
    pub fn new(status: StatusCode, headers: &HeaderMap) -> Self {
        ResponseMeta {
            status: status.as_u16(),
            content_length: header_value(headers, header::CONTENT_LENGTH.as_str()),
            response_time: header_value(headers, RESPONSE_TIME),
            response_time_seconds: header_value(headers, RESPONSE_TIME_SECONDS)
                .trim()
                .parse()
                .unwrap_or(0.0),
            response_status: header_value(headers, RESPONSE_STATUS),
        }
    }
}

impl LogRecord {
    /// Builds the record, measuring the request time against `start` now.
    pub fn build(req: &RequestMeta, res: &ResponseMeta, start: OffsetDateTime) -> Self {
        let elapsed = OffsetDateTime::now_utc() - start;
        Self::with_elapsed(req, res, elapsed)
    }

    pub(crate) fn with_elapsed(
        req: &RequestMeta,
        res: &ResponseMeta,
        elapsed: time::Duration,
    ) -> Self {
        LogRecord {
            method: req.method.clone(),
            uri: req.uri.clone(),
            proto: req.proto.clone(),
            status: res.status.into(),
            content_length: req.content_length,
            auth_proto: req.tls.protocol.clone(),
            cipher: req.tls.cipher.clone(),
            cms_auth_cert: req.auth_cert.clone(),
            cms_auth: req.auth_method.clone(),
            referer: req.referer.clone(),
            user_agent: req.user_agent.clone(),
            x_forwarded_host: req.forwarded_host.clone(),
            remote_addr: req.remote_addr.clone(),
            response_status: res.response_status.clone(),
            response_time: res.response_time_seconds,
            request_time: elapsed.as_seconds_f64(),
        }
    }
}

/// Renders the human-readable access line, newline included.
pub fn access_line(req: &RequestMeta, res: &ResponseMeta, elapsed: time::Duration) -> String {
    let mut line = String::with_capacity(256);
    let _ = writeln!(
        line,
        "[client: {}] [backend: {}] {} {} {} {} [data: {} in {} out] [auth: {} {} \"{}\" {}] [ref: \"{}\" \"{}\"] [req: {} resp: {}]",
        req.forwarded_host,
        req.remote_addr,
        req.method,
        req.uri,
        req.proto,
        res.status,
        req.content_length,
        res.content_length,
        req.tls.protocol,
        req.tls.cipher,
        req.auth_cert,
        req.auth_method,
        req.referer,
        req.user_agent,
        format_duration(elapsed.unsigned_abs()),
        res.response_time,
    );
    line
}

/// Compact duration rendering: `0s`, `850ns`, `1.5µs`, `12.345ms`, `2.5s`, `1m3s`, `1h0m0s`.
pub(crate) fn format_duration(duration: std::time::Duration) -> String {
    let nanos = duration.as_nanos();
    match nanos {
        0 => "0s".to_owned(),
        1..=999 => format!("{nanos}ns"),
        1_000..=999_999 => format!("{}µs", decimal(nanos, 3)),
        1_000_000..=999_999_999 => format!("{}ms", decimal(nanos, 6)),
        _ => {
            let secs = duration.as_secs();
            let hours = secs / 3600;
            let minutes = secs / 60 % 60;
            let seconds = decimal(
                u128::from(secs % 60) * 1_000_000_000 + u128::from(duration.subsec_nanos()),
                9,
            );
            if hours > 0 {
                format!("{hours}h{minutes}m{seconds}s")
            } else if minutes > 0 {
                format!("{minutes}m{seconds}s")
            } else {
                format!("{seconds}s")
            }
        }
    }
}

fn decimal(value: u128, scale: u32) -> String {
    let divisor = 10u128.pow(scale);
    let (whole, fraction) = (value / divisor, value % divisor);
    if fraction == 0 {
        whole.to_string()
    } else {
        let fraction = format!("{fraction:0width$}", width = scale as usize);
        format!("{whole}.{}", fraction.trim_end_matches('0'))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| v.to_str().unwrap_or_default().to_string())
        .unwrap_or_default()
}

/// Declared request body length, `-1` when it is unknown.
fn content_length(req: &HttpRequest) -> i64 {
    let headers = req.headers();
    match headers.get(header::CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(-1),
        None if headers.contains_key(header::TRANSFER_ENCODING) => -1,
        // HTTP/2 and HTTP/3 bodies need no length header and the end of stream is not visible
        // here, so a body-carrying method has an unknown length
        None if req.version() >= actix_http::Version::HTTP_2 => {
            match *req.method() {
                Method::POST | Method::PUT | Method::PATCH => -1,
                _ => 0,
            }
        }
        None => 0,
    }
}
