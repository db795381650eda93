use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use url::Url;

use super::{EngineError, TransferEngine, TransferError, TransferRequest, TransferSinks};
use crate::async_stream::AsyncStream;
use crate::config::FetchConfig;
use crate::http::{read_body, BodyFraming, HeaderMap, LineReader, ParsedResponseHead};
use crate::rustls_util::{create_connector, server_name};
use crate::sink::is_sink_aborted;
use crate::tokio_util::resolve_host;

/// Hop limit used to break redirect loops.
pub const MAX_REDIRECTS: usize = 50;

const LOG_PREFIX: &str = "http1";

/// Minimal HTTP/1.1 client engine on top of tokio and rustls.
///
/// Each transfer gets its own single-threaded runtime and its own
/// connections, and every connection is closed after one response.
pub struct Http1Engine {
    version: String,
    user_agent: String,
    connect_timeout: Duration,
    timeout: Option<Duration>,
    tls_connector: tokio_rustls::TlsConnector,
}

struct Target {
    host: String,
    port: u16,
    tls: bool,
    host_header: String,
    request_target: String,
}

enum HopOutcome {
    Done(u16),
    Redirect(String),
}

impl Http1Engine {
    pub fn new(config: &FetchConfig) -> std::io::Result<Self> {
        let tls_connector = create_connector(config.tls_verify, config.ca_cert_path.as_deref())?;
        Ok(Self {
            version: format!("fetchurl-http1/{} (rustls)", env!("CARGO_PKG_VERSION")),
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout(),
            timeout: config.timeout(),
            tls_connector,
        })
    }

    async fn run_transfer(
        &self,
        request: &TransferRequest,
        sinks: &mut TransferSinks<'_>,
    ) -> Result<u16, TransferError> {
        let mut url = parse_url(&request.url)?;
        let mut redirects = 0usize;

        loop {
            match self.run_hop(&url, sinks, request.follow_redirects).await? {
                HopOutcome::Done(status) => {
                    info!("[{}] GET {} [{}]", LOG_PREFIX, url, status);
                    return Ok(status);
                }
                HopOutcome::Redirect(location) => {
                    if redirects >= MAX_REDIRECTS {
                        return Err(TransferError::TooManyRedirects(redirects));
                    }
                    redirects += 1;

                    let next_url = url.join(&location).map_err(|e| TransferError::InvalidUrl {
                        url: location.clone(),
                        reason: e.to_string(),
                    })?;
                    debug!("[{}] GET {} [redirect: {}]", LOG_PREFIX, url, next_url);
                    url = next_url;
                }
            }
        }
    }

    async fn run_hop(
        &self,
        url: &Url,
        sinks: &mut TransferSinks<'_>,
        follow_redirects: bool,
    ) -> Result<HopOutcome, TransferError> {
        let target = Target::from_url(url)?;
        let mut stream = self.connect(&target).await?;
        let result = self
            .exchange(&mut stream, &target, sinks, follow_redirects)
            .await;
        let _ = stream.try_shutdown().await;
        result
    }

    async fn exchange(
        &self,
        stream: &mut Box<dyn AsyncStream>,
        target: &Target,
        sinks: &mut TransferSinks<'_>,
        follow_redirects: bool,
    ) -> Result<HopOutcome, TransferError> {
        let request_head = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nAccept-Encoding: identity\r\nConnection: close\r\n\r\n",
            target.request_target, target.host_header, self.user_agent
        );
        stream
            .write_all(request_head.as_bytes())
            .await
            .map_err(classify_io_error)?;
        stream.flush().await.map_err(classify_io_error)?;

        let mut reader = LineReader::new();
        let head = loop {
            let head = ParsedResponseHead::parse(stream, &mut reader, &mut *sinks.header)
                .await
                .map_err(classify_io_error)?;
            let status = head.status_code();
            if (100..200).contains(&status) && status != 101 {
                debug!("[{}] skipping interim response {}", LOG_PREFIX, status);
                continue;
            }
            break head;
        };

        let status = head.status_code();
        if follow_redirects && is_redirect(status) {
            if let Some(location) = head.headers().location() {
                return Ok(HopOutcome::Redirect(location.to_string()));
            }
        }

        let framing = BodyFraming::for_response(&head).map_err(classify_io_error)?;
        debug!("[{}] {} body framing: {:?}", LOG_PREFIX, status, framing);
        read_body(stream, reader, framing, &mut *sinks.body)
            .await
            .map_err(classify_io_error)?;

        Ok(HopOutcome::Done(status))
    }

    async fn connect(&self, target: &Target) -> Result<Box<dyn AsyncStream>, TransferError> {
        let addrs = resolve_host(&target.host, target.port)
            .await
            .map_err(|source| TransferError::Resolve {
                host: target.host.clone(),
                source,
            })?;

        let tcp_stream = self.connect_any(&addrs).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::TimedOut {
                TransferError::Timeout
            } else {
                TransferError::Connect {
                    host: target.host.clone(),
                    source,
                }
            }
        })?;

        if !target.tls {
            return Ok(Box::new(tcp_stream));
        }

        let tls_error = |source| TransferError::Tls {
            host: target.host.clone(),
            source,
        };
        let domain = server_name(&target.host).map_err(tls_error)?;
        let tls_stream = self
            .tls_connector
            .connect(domain, tcp_stream)
            .await
            .map_err(tls_error)?;
        Ok(Box::new(tls_stream))
    }

    async fn connect_any(&self, addrs: &[SocketAddr]) -> std::io::Result<TcpStream> {
        let mut last_error = None;
        for addr in addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    debug!("[{}] connect to {} failed: {}", LOG_PREFIX, addr, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    debug!("[{}] connect to {} timed out", LOG_PREFIX, addr);
                    last_error = Some(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", addr),
                    ));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses to connect to")
        }))
    }
}

impl TransferEngine for Http1Engine {
    fn version(&self) -> &str {
        &self.version
    }

    fn perform(
        &self,
        request: &TransferRequest,
        sinks: &mut TransferSinks<'_>,
    ) -> Result<u16, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Init)?;

        let status = runtime.block_on(async {
            let transfer = self.run_transfer(request, sinks);
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, transfer)
                    .await
                    .map_err(|_| TransferError::Timeout)?,
                None => transfer.await,
            }
        })?;

        Ok(status)
    }
}

impl Target {
    fn from_url(url: &Url) -> Result<Self, TransferError> {
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            scheme => return Err(TransferError::UnsupportedScheme(scheme.to_string())),
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransferError::InvalidUrl {
                url: url.to_string(),
                reason: "no host".to_string(),
            })?
            .to_string();

        let port = url
            .port_or_known_default()
            .unwrap_or(if tls { 443 } else { 80 });

        let host_header = match url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.clone(),
        };

        let mut request_target = url.path().to_string();
        if request_target.is_empty() {
            request_target.push('/');
        }
        if let Some(query) = url.query() {
            request_target.push('?');
            request_target.push_str(query);
        }

        Ok(Self {
            host,
            port,
            tls,
            host_header,
            request_target,
        })
    }
}

/// Parses `url`, assuming `http://` when no scheme is given.
fn parse_url(url: &str) -> Result<Url, TransferError> {
    let invalid = |e: url::ParseError| TransferError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    };
    match Url::parse(url) {
        Ok(parsed) => Ok(parsed),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{}", url)).map_err(invalid)
        }
        Err(e) => Err(invalid(e)),
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn classify_io_error(error: std::io::Error) -> TransferError {
    if is_sink_aborted(&error) {
        return TransferError::Aborted;
    }
    match error.kind() {
        std::io::ErrorKind::TimedOut => TransferError::Timeout,
        std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
            TransferError::Protocol(error)
        }
        _ => TransferError::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> Target {
        Target::from_url(&parse_url(url).unwrap()).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    fn target_defaults() {
        let t = target("http://example.com");
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 80);
        assert!(!t.tls);
        assert_eq!(t.host_header, "example.com");
        assert_eq!(t.request_target, "/");
    }

    #[test]
    fn target_with_port_and_query() {
        let t = target("https://example.com:8443/a/b?x=1&y=2#frag");
        assert_eq!(t.port, 8443);
        assert!(t.tls);
        assert_eq!(t.host_header, "example.com:8443");
        assert_eq!(t.request_target, "/a/b?x=1&y=2");
    }

    #[test]
    fn target_ipv6() {
        let t = target("http://[::1]:8080/");
        assert_eq!(t.host, "[::1]");
        assert_eq!(t.host_header, "[::1]:8080");
    }

    #[test]
    fn missing_scheme_defaults_to_http() {
        assert_eq!(
            parse_url("example.com/path").unwrap().as_str(),
            "http://example.com/path"
        );
    }

    #[test]
    fn unsupported_scheme() {
        let url = parse_url("ftp://example.com/file").unwrap();
        assert!(matches!(
            Target::from_url(&url),
            Err(TransferError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn malformed_url() {
        assert!(matches!(
            parse_url("http://exa mple.com/"),
            Err(TransferError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn redirect_statuses() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status));
        }
        for status in [200, 300, 304, 404] {
            assert!(!is_redirect(status));
        }
    }

    #[test]
    fn io_error_classification() {
        let aborted = std::io::Error::other(crate::sink::SinkAborted {
            consumed: 0,
            len: 4,
        });
        assert!(matches!(classify_io_error(aborted), TransferError::Aborted));
        assert!(matches!(
            classify_io_error(std::io::ErrorKind::UnexpectedEof.into()),
            TransferError::Protocol(_)
        ));
        assert!(matches!(
            classify_io_error(std::io::ErrorKind::ConnectionReset.into()),
            TransferError::Io(_)
        ));
    }
}
