use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// A connection to an origin server, plain or TLS.
#[async_trait]
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {
    async fn try_shutdown(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl AsyncStream for TcpStream {
    async fn try_shutdown(&mut self) -> std::io::Result<()> {
        self.shutdown().await
    }
}

#[async_trait]
impl<IO> AsyncStream for tokio_rustls::client::TlsStream<IO>
where
    IO: AsyncStream,
{
    async fn try_shutdown(&mut self) -> std::io::Result<()> {
        self.shutdown().await
    }
}
