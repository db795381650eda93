//! Blocking HTTP GET that returns the response body as UTF-8 text.
//!
//! [`Fetcher::fetch`] runs one transfer through a [`TransferEngine`],
//! collecting the body and the declared `Content-Type` into a per-call
//! [`TransferState`](transfer_state::TransferState). The result encoder then
//! extracts mime type and charset and converts the body with the
//! [`transcode`] function.

mod async_stream;
pub mod binding;
pub mod body_accumulator;
pub mod config;
pub mod engine;
pub mod fetch_result;
pub mod fetcher;
pub mod header_collector;
mod http;
pub mod result_encoder;
mod rustls_util;
pub mod sink;
mod tokio_util;
pub mod transcoder;
pub mod transfer_state;
mod util;

pub use binding::{BindingError, HostModule};
pub use config::{load_config, FetchConfig};
pub use engine::{EngineError, Http1Engine, TransferEngine, TransferError};
pub use fetch_result::FetchResult;
pub use fetcher::{FetchError, Fetcher};
pub use sink::TransferSink;
pub use transcoder::transcode;
