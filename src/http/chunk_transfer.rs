use std::collections::HashMap;

use memchr::memmem;

// Room for the hex length, any chunk extensions, and \r\n.
const CHUNK_SIZE_LEN: usize = 1024;
const TRAILER_HEADER_LEN: usize = 4096;

/// Incremental decoder for `Transfer-Encoding: chunked` bodies.
///
/// Feed it whatever the socket returned; each call to `step` consumes a prefix
/// of the input and may hand back a slice of decoded payload.
pub struct ChunkTransfer {
    state: ChunkTransferState,
    read_size_buf: Box<[u8; CHUNK_SIZE_LEN]>,
    trailer_header_buf: Box<[u8; TRAILER_HEADER_LEN]>,
    trailer_headers: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Eq)]
enum ChunkTransferState {
    ReadSize {
        cached_len: usize,
    },
    ReadData {
        chunk_len: usize,
        remaining_len: usize,
    },
    ReadTrailer {
        cached_len: usize,
    },
    Done,
}

pub struct ChunkStep<'a> {
    pub consumed: usize,
    pub payload: &'a [u8],
}

impl ChunkTransfer {
    pub fn new() -> Self {
        Self {
            state: ChunkTransferState::ReadSize { cached_len: 0 },
            read_size_buf: Box::new([0u8; CHUNK_SIZE_LEN]),
            trailer_header_buf: Box::new([0u8; TRAILER_HEADER_LEN]),
            trailer_headers: HashMap::new(),
        }
    }

    /// Decodes all of `data`, passing every payload slice to `on_payload`.
    pub fn run<F>(&mut self, data: &[u8], mut on_payload: F) -> std::io::Result<()>
    where
        F: FnMut(&[u8]) -> std::io::Result<()>,
    {
        let mut start_offset = 0usize;
        while start_offset < data.len() {
            if self.is_done() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "extra data after trailers",
                ));
            }
            let step = self.step(&data[start_offset..])?;
            if !step.payload.is_empty() {
                on_payload(step.payload)?;
            }
            start_offset += step.consumed;
        }
        Ok(())
    }

    pub fn step<'a>(&mut self, unused: &'a [u8]) -> std::io::Result<ChunkStep<'a>> {
        use ChunkTransferState::*;

        match self.state {
            ReadSize { cached_len } => {
                let copy_len = std::cmp::min(CHUNK_SIZE_LEN - cached_len, unused.len());
                let new_cached_len = cached_len + copy_len;
                self.read_size_buf[cached_len..new_cached_len]
                    .copy_from_slice(&unused[0..copy_len]);

                match memmem::find(&self.read_size_buf[0..new_cached_len], b"\r\n") {
                    Some(i) => {
                        let chunk_len = parse_chunk_size(&self.read_size_buf[0..i])?;

                        // the size line and \r\n, minus what was cached from earlier calls.
                        let consumed = i + 2 - cached_len;

                        if chunk_len > 0 {
                            // the chunk is followed by \r\n, which is not payload.
                            let remaining_len = chunk_len.checked_add(2).ok_or_else(|| {
                                std::io::Error::new(
                                    std::io::ErrorKind::InvalidData,
                                    format!("chunk length too large: {}", chunk_len),
                                )
                            })?;
                            self.state = ReadData {
                                chunk_len,
                                remaining_len,
                            };
                        } else {
                            // https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Trailer
                            self.state = ReadTrailer { cached_len: 0 };
                        }
                        Ok(ChunkStep {
                            consumed,
                            payload: &[],
                        })
                    }
                    None => {
                        if new_cached_len == self.read_size_buf.len() {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "could not read chunk length in initial bytes",
                            ));
                        }
                        self.state = ReadSize {
                            cached_len: new_cached_len,
                        };
                        Ok(ChunkStep {
                            consumed: copy_len,
                            payload: &[],
                        })
                    }
                }
            }
            ReadData {
                chunk_len,
                remaining_len,
            } => {
                let consumed = std::cmp::min(unused.len(), remaining_len);
                // Bytes still owed to the payload before the closing \r\n.
                let payload_remaining = remaining_len.saturating_sub(2);
                let payload_len = std::cmp::min(consumed, payload_remaining);

                let new_remaining_len = remaining_len - consumed;
                if new_remaining_len == 0 {
                    self.state = ReadSize { cached_len: 0 };
                } else {
                    self.state = ReadData {
                        chunk_len,
                        remaining_len: new_remaining_len,
                    };
                }

                Ok(ChunkStep {
                    consumed,
                    payload: &unused[0..payload_len],
                })
            }
            ReadTrailer { cached_len } => {
                let copy_len = std::cmp::min(TRAILER_HEADER_LEN - cached_len, unused.len());
                let new_cached_len = cached_len + copy_len;
                self.trailer_header_buf[cached_len..new_cached_len]
                    .copy_from_slice(&unused[0..copy_len]);

                match memmem::find(&self.trailer_header_buf[0..new_cached_len], b"\r\n") {
                    Some(i) => {
                        let consumed = i + 2 - cached_len;

                        if i > 0 {
                            let trailer_header_str =
                                std::str::from_utf8(&self.trailer_header_buf[0..i]).map_err(
                                    |e| {
                                        std::io::Error::new(
                                            std::io::ErrorKind::InvalidData,
                                            format!("failed to parse trailer header: {}", e),
                                        )
                                    },
                                )?;
                            let (key, value) =
                                trailer_header_str.split_once(':').ok_or_else(|| {
                                    std::io::Error::new(
                                        std::io::ErrorKind::InvalidData,
                                        format!("invalid trailer header: {}", trailer_header_str),
                                    )
                                })?;
                            self.trailer_headers
                                .insert(key.trim().to_lowercase(), value.trim().to_string());
                            self.state = ReadTrailer { cached_len: 0 };
                        } else {
                            // empty line, end of the body.
                            self.state = Done;
                        }
                        Ok(ChunkStep {
                            consumed,
                            payload: &[],
                        })
                    }
                    None => {
                        if new_cached_len == self.trailer_header_buf.len() {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                "could not read trailer header, line too long",
                            ));
                        }
                        self.state = ReadTrailer {
                            cached_len: new_cached_len,
                        };
                        Ok(ChunkStep {
                            consumed: copy_len,
                            payload: &[],
                        })
                    }
                }
            }
            Done => Ok(ChunkStep {
                consumed: 0,
                payload: &[],
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkTransferState::Done
    }

    pub fn trailer_headers(&self) -> &HashMap<String, String> {
        &self.trailer_headers
    }
}

fn parse_chunk_size(size_line: &[u8]) -> std::io::Result<usize> {
    // Chunk extensions (";name=value") carry nothing we use.
    let size_bytes = match memchr::memchr(b';', size_line) {
        Some(i) => &size_line[..i],
        None => size_line,
    };
    let hex_str = std::str::from_utf8(size_bytes)
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid hex string: {}", e),
            )
        })?
        .trim();

    if hex_str.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no chunk length",
        ));
    }

    usize::from_str_radix(hex_str, 16).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid hex size ({}): {}", hex_str, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_in_pieces(encoded: &[u8], piece_len: usize) -> std::io::Result<(Vec<u8>, bool)> {
        let mut chunk_transfer = ChunkTransfer::new();
        let mut decoded = Vec::new();
        for piece in encoded.chunks(piece_len) {
            chunk_transfer.run(piece, |payload| {
                decoded.extend_from_slice(payload);
                Ok(())
            })?;
        }
        Ok((decoded, chunk_transfer.is_done()))
    }

    #[test]
    fn decodes_whole_body() {
        let encoded = b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n";
        let (decoded, done) = decode_in_pieces(encoded, encoded.len()).unwrap();
        assert_eq!(decoded, b"hello, world");
        assert!(done);
    }

    #[test]
    fn decodes_any_split() {
        let encoded = b"4\r\nWiki\r\n6\r\npedia \r\nE\r\nin \r\n\r\nchunks.\r\n0\r\n\r\n";
        for piece_len in 1..encoded.len() {
            let (decoded, done) = decode_in_pieces(encoded, piece_len).unwrap();
            assert_eq!(decoded, b"Wikipedia in \r\n\r\nchunks.", "piece_len {}", piece_len);
            assert!(done);
        }
    }

    #[test]
    fn ignores_chunk_extensions() {
        let encoded = b"3;name=value\r\nabc\r\n0\r\n\r\n";
        let (decoded, done) = decode_in_pieces(encoded, 2).unwrap();
        assert_eq!(decoded, b"abc");
        assert!(done);
    }

    #[test]
    fn collects_trailers() {
        let mut chunk_transfer = ChunkTransfer::new();
        chunk_transfer
            .run(b"1\r\nx\r\n0\r\nExpires: never\r\n\r\n", |_| Ok(()))
            .unwrap();
        assert!(chunk_transfer.is_done());
        assert_eq!(
            chunk_transfer.trailer_headers().get("expires").map(String::as_str),
            Some("never")
        );
    }

    #[test]
    fn rejects_bad_size() {
        assert!(decode_in_pieces(b"zz\r\nabc\r\n", 64).is_err());
        assert!(decode_in_pieces(b"\r\nabc\r\n", 64).is_err());
    }

    #[test]
    fn rejects_overflowing_size() {
        let mut chunk_transfer = ChunkTransfer::new();
        let err = chunk_transfer
            .run(b"ffffffffffffffff\r\nabc", |_| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        let too_long = format!("{:x}\r\n", u128::from(u64::MAX) + 1);
        assert!(decode_in_pieces(too_long.as_bytes(), 64).is_err());
    }

    #[test]
    fn rejects_data_after_end() {
        assert!(decode_in_pieces(b"0\r\n\r\nextra", 64).is_err());
    }

    #[test]
    fn incomplete_body_is_not_done() {
        let (decoded, done) = decode_in_pieces(b"5\r\nhel", 64).unwrap();
        assert_eq!(decoded, b"hel");
        assert!(!done);
    }

    #[test]
    fn payload_callback_error_stops_decoding() {
        let mut chunk_transfer = ChunkTransfer::new();
        let result = chunk_transfer.run(b"3\r\nabc\r\n0\r\n\r\n", |_| {
            Err(std::io::Error::other("sink refused"))
        });
        assert!(result.is_err());
    }
}
