use memchr::memchr2;

use crate::sink::TransferSink;

const CONTENT_TYPE_PREFIX: &[u8] = b"Content-Type: ";

/// Watches raw header lines for the declared content type.
///
/// Only lines starting with the exact prefix `Content-Type: ` are considered.
/// The engine delivers every hop's headers, so a later hop overwrites the
/// value captured from an earlier one.
#[derive(Debug, Default)]
pub struct HeaderCollector {
    content_type: Option<String>,
}

impl HeaderCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn into_content_type(self) -> Option<String> {
        self.content_type
    }
}

impl TransferSink for HeaderCollector {
    fn observe(&mut self, line: &[u8]) -> usize {
        if let Some(rest) = line.strip_prefix(CONTENT_TYPE_PREFIX) {
            let value = match memchr2(b'\r', b'\n', rest) {
                Some(end) => &rest[..end],
                None => rest,
            };
            if !value.is_empty() {
                self.content_type = Some(String::from_utf8_lossy(value).into_owned());
            }
        }
        line.len()
    }
}
