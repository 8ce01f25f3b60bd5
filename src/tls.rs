//! TLS protocol and cipher suite labels

use rustls::{CipherSuite, CommonState, ProtocolVersion};

pub(crate) const NO_TLS: &str = "No TLS";
pub(crate) const NO_CIPHER: &str = "None";

/// Negotiated parameters of a TLS connection.
///
/// Store it as connection data from [`HttpServer::on_connect`](actix_web::HttpServer::on_connect)
/// so the access logger can label requests with it. Plaintext connections have no `TlsInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsInfo {
    /// Raw protocol version, e.g. `0x0304` for TLS 1.3
    pub version: u16,
    /// Raw IANA cipher suite value
    pub cipher_suite: u16,
}

impl TlsInfo {
    pub fn new(version: ProtocolVersion, cipher_suite: CipherSuite) -> Self {
        Self {
            version: version.into(),
            cipher_suite: cipher_suite.into(),
        }
    }

    /// Captures the negotiated parameters, `None` until the handshake has completed.
    pub fn from_connection(conn: &CommonState) -> Option<Self> {
        let version = conn.protocol_version()?;
        let suite = conn.negotiated_cipher_suite()?;
        Some(Self::new(version, suite.suite()))
    }
}

/// Protocol and cipher labels as they appear in access logs and records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsLabels {
    pub protocol: String,
    pub cipher: String,
}

impl TlsLabels {
    /// Maps a connection to its labels, `("No TLS", "None")` for plaintext connections.
    pub fn inspect(tls: Option<&TlsInfo>) -> Self {
        match tls {
            Some(tls) => Self {
                protocol: protocol_label(tls.version),
                cipher: cipher_label(tls.cipher_suite),
            },
            None => Self {
                protocol: NO_TLS.to_owned(),
                cipher: NO_CIPHER.to_owned(),
            },
        }
    }
}

fn protocol_label(version: u16) -> String {
    let label = match ProtocolVersion::from(version) {
        ProtocolVersion::SSLv3 => "SSL30",
        ProtocolVersion::TLSv1_0 => "TLS10",
        ProtocolVersion::TLSv1_1 => "TLS11",
        ProtocolVersion::TLSv1_2 => "TLS12",
        ProtocolVersion::TLSv1_3 => "TLS13",
        _ => return format!("TLS version: {version}"),
    };
    label.to_owned()
}

/// IANA name of a cipher suite. rustls prefixes the TLS 1.3 suites with `TLS13_`, the registry
/// names do not.
fn cipher_label(suite: u16) -> String {
    let label = match suite {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0x1304 => "TLS_AES_128_CCM_SHA256",
        0x1305 => "TLS_AES_128_CCM_8_SHA256",
        _ => return format!("{:?}", CipherSuite::from(suite)),
    };
    label.to_owned()
}
