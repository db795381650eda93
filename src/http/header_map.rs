use std::collections::HashMap;

/// Framing and redirect lookups over lowercased response headers.
pub trait HeaderMap {
    fn chunked(&self) -> bool;
    fn content_length(&self) -> std::io::Result<Option<usize>>;
    fn location(&self) -> Option<&str>;
}

impl HeaderMap for HashMap<String, String> {
    fn chunked(&self) -> bool {
        self.get("transfer-encoding")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .any(|s| s.eq_ignore_ascii_case("chunked"))
            })
            .unwrap_or(false)
    }

    fn content_length(&self) -> std::io::Result<Option<usize>> {
        match self.get("content-length") {
            Some(value) => match value.parse::<usize>() {
                Ok(len) => Ok(Some(len)),
                Err(e) => Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Could not parse content length: {}", e),
                )),
            },
            None => Ok(None),
        }
    }

    fn location(&self) -> Option<&str> {
        self.get("location")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}
