mod chunk_transfer;
mod header_map;
mod http_parser;
mod line_reader;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::sink::{deliver, TransferSink};

pub use header_map::HeaderMap;
pub use http_parser::ParsedResponseHead;
pub use line_reader::LineReader;

/// How the end of a response body is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
    UntilEof,
}

impl BodyFraming {
    pub fn for_response(head: &ParsedResponseHead) -> std::io::Result<Self> {
        let status = head.status_code();
        if (100..200).contains(&status) || status == 204 || status == 304 {
            return Ok(BodyFraming::Empty);
        }

        let chunked = head.headers().chunked();
        let content_length = head.headers().content_length()?;

        if chunked && content_length.is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Chunked transfer encoding and content length both provided",
            ));
        }

        Ok(if chunked {
            BodyFraming::Chunked
        } else if let Some(len) = content_length {
            BodyFraming::Length(len)
        } else {
            BodyFraming::UntilEof
        })
    }
}

/// Reads a response body from `stream` and hands the decoded bytes to
/// `body_sink` in the sizes they arrive.
///
/// `reader` holds whatever was read past the response head.
pub async fn read_body<R>(
    stream: &mut R,
    reader: LineReader,
    framing: BodyFraming,
    body_sink: &mut dyn TransferSink,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match framing {
        BodyFraming::Empty => {
            if !reader.unparsed_data().is_empty() {
                debug!(
                    "Ignoring {} bytes after a response without body",
                    reader.unparsed_data().len()
                );
            }
            Ok(())
        }
        BodyFraming::Length(len) => read_content_with_length(stream, reader, len, body_sink).await,
        BodyFraming::Chunked => read_chunked_content(stream, reader, body_sink).await,
        BodyFraming::UntilEof => read_content_until_eof(stream, reader, body_sink).await,
    }
}

async fn read_content_with_length<R>(
    stream: &mut R,
    reader: LineReader,
    content_length: usize,
    body_sink: &mut dyn TransferSink,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let unparsed_data = reader.unparsed_data();
    let initial_len = std::cmp::min(unparsed_data.len(), content_length);
    if unparsed_data.len() > content_length {
        debug!(
            "Dropping {} bytes past the content length",
            unparsed_data.len() - content_length
        );
    }
    if initial_len > 0 {
        deliver(body_sink, &unparsed_data[0..initial_len])?;
    }

    let mut remaining = content_length - initial_len;
    let mut buf = reader.into_buf();
    while remaining > 0 {
        let max_len = std::cmp::min(remaining, buf.len());
        let read_len = stream.read(&mut buf[0..max_len]).await?;
        if read_len == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "Got EOF while reading content with length, {} bytes were remaining",
                    remaining
                ),
            ));
        }
        deliver(body_sink, &buf[0..read_len])?;
        remaining -= read_len;
    }
    Ok(())
}

async fn read_chunked_content<R>(
    stream: &mut R,
    reader: LineReader,
    body_sink: &mut dyn TransferSink,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk_transfer = chunk_transfer::ChunkTransfer::new();
    chunk_transfer.run(reader.unparsed_data(), |payload| deliver(body_sink, payload))?;

    let mut buf = reader.into_buf();
    while !chunk_transfer.is_done() {
        let read_len = stream.read(&mut buf).await?;
        if read_len == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Got EOF during chunk transfer",
            ));
        }
        chunk_transfer.run(&buf[0..read_len], |payload| deliver(body_sink, payload))?;
    }

    if !chunk_transfer.trailer_headers().is_empty() {
        debug!("Chunk trailers: {:?}", chunk_transfer.trailer_headers());
    }

    Ok(())
}

async fn read_content_until_eof<R>(
    stream: &mut R,
    reader: LineReader,
    body_sink: &mut dyn TransferSink,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    if !reader.unparsed_data().is_empty() {
        deliver(body_sink, reader.unparsed_data())?;
    }

    let mut buf = reader.into_buf();
    loop {
        let read_len = match stream.read(&mut buf).await {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // TLS peers often close without close_notify.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        if read_len == 0 {
            return Ok(());
        }
        deliver(body_sink, &buf[0..read_len])?;
    }
}
