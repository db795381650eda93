use log::{debug, warn};

use crate::body_accumulator::Exhaustion;
use crate::config::FetchConfig;
use crate::engine::{EngineError, Http1Engine, TransferEngine, TransferRequest};
use crate::fetch_result::FetchResult;
use crate::result_encoder::encode;
use crate::transfer_state::TransferState;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to initialize transfer: {0}")]
    Init(#[source] std::io::Error),

    #[error("response body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    #[error("out of memory while collecting the response body")]
    ResourceExhausted,
}

impl From<Exhaustion> for FetchError {
    fn from(exhaustion: Exhaustion) -> Self {
        match exhaustion {
            Exhaustion::LimitExceeded { limit } => FetchError::BodyTooLarge { limit },
            Exhaustion::OutOfMemory => FetchError::ResourceExhausted,
        }
    }
}

/// Runs blocking GET requests and packages the responses.
///
/// A fetcher holds no per-request state, so one instance can be shared
/// between threads; every call gets its own [`TransferState`].
pub struct Fetcher<E = Http1Engine> {
    engine: E,
    max_body_bytes: Option<usize>,
}

impl Fetcher<Http1Engine> {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let engine = Http1Engine::new(config).map_err(FetchError::Init)?;
        Ok(Self::with_engine(engine, config.max_body_bytes))
    }
}

impl<E: TransferEngine> Fetcher<E> {
    pub fn with_engine(engine: E, max_body_bytes: Option<usize>) -> Self {
        Self {
            engine,
            max_body_bytes,
        }
    }

    pub fn engine_version(&self) -> &str {
        self.engine.version()
    }

    /// Fetches `url`, following redirects, and blocks until done.
    ///
    /// Transport failures are not errors: they produce a result with status
    /// `-1`. Errors are reserved for an engine that cannot start a transfer
    /// and for running out of room for the body.
    pub fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let mut state = TransferState::new(self.max_body_bytes);
        let request = TransferRequest::get(url);

        let outcome = self.engine.perform(&request, &mut state.sinks());

        if let Some(exhaustion) = state.body().exhaustion() {
            return Err(exhaustion.into());
        }

        match outcome {
            Ok(status) => {
                debug!(
                    "GET {} finished with {} ({} body bytes)",
                    url,
                    status,
                    state.body().len()
                );
                state.set_http_status(status);
            }
            Err(EngineError::Init(e)) => return Err(FetchError::Init(e)),
            Err(EngineError::Transfer(e)) => {
                warn!("GET {} failed: {}", url, e);
            }
        }

        Ok(encode(state.http_status(), state))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::{TransferError, TransferSinks};
    use crate::sink::TransferSink;

    enum Script {
        Respond {
            status: u16,
            headers: Vec<&'static str>,
            chunks: Vec<Vec<u8>>,
        },
        FailTransfer,
        FailInit,
    }

    struct ScriptedEngine {
        script: Script,
    }

    fn deliver_all(
        sinks: &mut TransferSinks<'_>,
        headers: &[&str],
        chunks: &[Vec<u8>],
    ) -> Result<(), EngineError> {
        for line in headers {
            if sinks.header.observe(line.as_bytes()) != line.len() {
                return Err(TransferError::Aborted.into());
            }
        }
        for chunk in chunks {
            if sinks.body.observe(chunk) != chunk.len() {
                return Err(TransferError::Aborted.into());
            }
        }
        Ok(())
    }

    impl TransferEngine for ScriptedEngine {
        fn version(&self) -> &str {
            "scripted/1.0"
        }

        fn perform(
            &self,
            request: &TransferRequest,
            sinks: &mut TransferSinks<'_>,
        ) -> Result<u16, EngineError> {
            assert!(request.follow_redirects);
            match &self.script {
                Script::Respond {
                    status,
                    headers,
                    chunks,
                } => {
                    deliver_all(sinks, headers, chunks)?;
                    Ok(*status)
                }
                Script::FailTransfer => {
                    sinks.header.observe(b"Content-Type: text/plain\r\n");
                    sinks.body.observe(b"partial");
                    Err(TransferError::Timeout.into())
                }
                Script::FailInit => Err(EngineError::Init(std::io::Error::other(
                    "no transfer handle",
                ))),
            }
        }
    }

    fn fetcher(script: Script) -> Fetcher<ScriptedEngine> {
        Fetcher::with_engine(ScriptedEngine { script }, None)
    }

    #[test]
    fn latin1_page() {
        let fetcher = fetcher(Script::Respond {
            status: 200,
            headers: vec![
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: text/html; charset=ISO-8859-1\r\n",
                "\r\n",
            ],
            chunks: vec![vec![0xE9]],
        });
        let result = fetcher.fetch("http://example.com/").unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.mime_type.as_deref(), Some("text/html"));
        assert_eq!(result.charset.as_deref(), Some("ISO-8859-1"));
        assert_eq!(result.text(), "é");
    }

    #[test]
    fn plain_body_without_content_type() {
        let fetcher = fetcher(Script::Respond {
            status: 200,
            headers: vec!["HTTP/1.1 200 OK\r\n", "\r\n"],
            chunks: vec![b"hel".to_vec(), b"lo".to_vec()],
        });
        let result = fetcher.fetch("http://example.com/").unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.mime_type, None);
        assert_eq!(result.charset, None);
        assert_eq!(result.text(), "hello");
    }

    #[test]
    fn last_content_type_wins_across_hops() {
        let fetcher = fetcher(Script::Respond {
            status: 200,
            headers: vec![
                "HTTP/1.1 302 Found\r\n",
                "Content-Type: text/html\r\n",
                "Location: /next\r\n",
                "\r\n",
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: application/json\r\n",
                "\r\n",
            ],
            chunks: vec![b"[]".to_vec()],
        });
        let result = fetcher.fetch("http://example.com/").unwrap();
        assert_eq!(result.mime_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn transport_failure_is_status_minus_one() {
        let result = fetcher(Script::FailTransfer)
            .fetch("http://unreachable.invalid/")
            .unwrap();
        assert_eq!(result, FetchResult::status_only(-1));
    }

    #[test]
    fn init_failure_is_an_error() {
        assert!(matches!(
            fetcher(Script::FailInit).fetch("http://example.com/"),
            Err(FetchError::Init(_))
        ));
    }

    #[test]
    fn body_limit_is_an_error() {
        let fetcher = Fetcher::with_engine(
            ScriptedEngine {
                script: Script::Respond {
                    status: 200,
                    headers: vec!["HTTP/1.1 200 OK\r\n", "\r\n"],
                    chunks: vec![vec![b'x'; 8], vec![b'y'; 8]],
                },
            },
            Some(10),
        );
        assert!(matches!(
            fetcher.fetch("http://example.com/"),
            Err(FetchError::BodyTooLarge { limit: 10 })
        ));
    }

    #[test]
    fn engine_version_is_forwarded() {
        assert_eq!(fetcher(Script::FailInit).engine_version(), "scripted/1.0");
    }

    /// Serves `len` copies of `byte` for URLs of the form `http://<byte>/<len>`,
    /// yielding between small chunks so concurrent transfers interleave.
    struct RoutingEngine;

    impl TransferEngine for RoutingEngine {
        fn version(&self) -> &str {
            "routing/1.0"
        }

        fn perform(
            &self,
            request: &TransferRequest,
            sinks: &mut TransferSinks<'_>,
        ) -> Result<u16, EngineError> {
            let path = request.url.trim_start_matches("http://");
            let (host, len) = path.split_once('/').ok_or(TransferError::Aborted)?;
            let len: usize = len.parse().map_err(|_| TransferError::Aborted)?;
            let byte = host.as_bytes()[0];

            let body = vec![byte; len];
            let chunks: Vec<Vec<u8>> = body.chunks(7).map(|c| c.to_vec()).collect();
            for chunk in &chunks {
                deliver_all(sinks, &[], std::slice::from_ref(chunk))?;
                std::thread::yield_now();
            }
            Ok(200)
        }
    }

    #[test]
    fn concurrent_fetches_are_isolated() {
        let fetcher = Arc::new(Fetcher::with_engine(RoutingEngine, None));

        let handles: Vec<_> = [("a", 500usize), ("b", 50usize)]
            .into_iter()
            .map(|(host, len)| {
                let fetcher = fetcher.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let result = fetcher.fetch(&format!("http://{}/{}", host, len)).unwrap();
                        assert_eq!(result.status, 200);
                        assert_eq!(result.text(), host.repeat(len));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
