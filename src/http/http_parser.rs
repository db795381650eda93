use std::collections::HashMap;

use tokio::io::AsyncRead;

use super::line_reader::{trim_line_ending, LineReader};
use crate::sink::{deliver, TransferSink};

const MAX_HEADER_LINES: usize = 100;

/// Status line and headers of one HTTP response.
///
/// Header names are lowercased; when a header repeats, the last value wins.
pub struct ParsedResponseHead {
    status_code: u16,
    headers: HashMap<String, String>,
}

impl ParsedResponseHead {
    /// Reads one response head, passing every raw line (status line, header
    /// lines and the terminating blank line) to `header_sink`.
    pub async fn parse<T>(
        stream: &mut T,
        line_reader: &mut LineReader,
        header_sink: &mut dyn TransferSink,
    ) -> std::io::Result<Self>
    where
        T: AsyncRead + Unpin,
    {
        let status_line = line_reader.read_line_bytes(stream).await?;
        deliver(header_sink, status_line)?;
        let status_code = parse_status_line(trim_line_ending(status_line))?;

        let mut headers: HashMap<String, String> = HashMap::new();
        let mut line_count = 0;
        loop {
            let raw_line = line_reader.read_line_bytes(stream).await?;
            deliver(header_sink, raw_line)?;

            let line = trim_line_ending(raw_line);
            if line.is_empty() {
                break;
            }

            line_count += 1;
            if line_count > MAX_HEADER_LINES {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "http response has too many headers",
                ));
            }

            // Folded continuation lines are passed on but not parsed.
            if line[0] == b' ' || line[0] == b'\t' {
                continue;
            }

            let line = String::from_utf8_lossy(line);
            let (key, value) = line.split_once(':').ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid http header line: {}", line),
                )
            })?;
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        Ok(Self {
            status_code,
            headers,
        })
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

fn parse_status_line(line: &[u8]) -> std::io::Result<u16> {
    let invalid = || {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "invalid http status line: {}",
                String::from_utf8_lossy(line)
            ),
        )
    };

    let line = std::str::from_utf8(line).map_err(|_| invalid())?;
    let mut tokens = line.split_ascii_whitespace();
    match tokens.next() {
        Some(version) if version.starts_with("HTTP/") => (),
        _ => return Err(invalid()),
    }
    let code = tokens.next().ok_or_else(invalid)?;
    if code.len() != 3 {
        return Err(invalid());
    }
    code.parse::<u16>().map_err(|_| invalid())
}
