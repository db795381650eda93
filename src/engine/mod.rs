//! The seam between the fetch core and whatever moves bytes over the network.
//!
//! A [`TransferEngine`] performs one blocking transfer per call and streams
//! what it receives into the two sinks it is given. The core never sees
//! sockets, TLS or redirects, only raw header lines, body chunks and the
//! final outcome.

mod http1;

pub use http1::{Http1Engine, MAX_REDIRECTS};

use crate::sink::TransferSink;

/// What to fetch. Only GET is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub follow_redirects: bool,
}

impl TransferRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            follow_redirects: true,
        }
    }
}

/// The sinks registered for one transfer.
pub struct TransferSinks<'a> {
    pub body: &'a mut dyn TransferSink,
    pub header: &'a mut dyn TransferSink,
}

/// Categories of transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("malformed url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("could not resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer timed out")]
    Timeout,

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("malformed response: {0}")]
    Protocol(#[source] std::io::Error),

    #[error("transfer aborted by sink")]
    Aborted,

    #[error("connection error: {0}")]
    Io(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not initialize transfer: {0}")]
    Init(#[source] std::io::Error),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

pub trait TransferEngine: Send + Sync {
    /// Human readable engine name and version.
    fn version(&self) -> &str;

    /// Runs one transfer to completion, blocking the calling thread.
    ///
    /// Returns the status code of the final response after any redirects.
    fn perform(
        &self,
        request: &TransferRequest,
        sinks: &mut TransferSinks<'_>,
    ) -> Result<u16, EngineError>;
}
