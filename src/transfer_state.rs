use crate::body_accumulator::BodyAccumulator;
use crate::engine::TransferSinks;
use crate::header_collector::HeaderCollector;

/// Status recorded until a transfer completes.
pub const NO_STATUS: i32 = -1;

/// Everything one in-flight fetch accumulates.
///
/// Created at the start of a fetch and consumed by the result encoder, so it
/// never outlives the call that owns it.
#[derive(Debug)]
pub struct TransferState {
    body: BodyAccumulator,
    headers: HeaderCollector,
    http_status: i32,
}

impl TransferState {
    pub fn new(max_body_bytes: Option<usize>) -> Self {
        Self {
            body: BodyAccumulator::with_limit(max_body_bytes),
            headers: HeaderCollector::new(),
            http_status: NO_STATUS,
        }
    }

    /// Borrows the body and header sinks for one engine transfer.
    pub fn sinks(&mut self) -> TransferSinks<'_> {
        TransferSinks {
            body: &mut self.body,
            header: &mut self.headers,
        }
    }

    pub fn set_http_status(&mut self, status: u16) {
        self.http_status = i32::from(status);
    }

    pub fn http_status(&self) -> i32 {
        self.http_status
    }

    pub fn body(&self) -> &BodyAccumulator {
        &self.body
    }

    pub fn declared_mime_type(&self) -> Option<&str> {
        self.headers.content_type()
    }

    pub fn into_parts(self) -> (Vec<u8>, Option<String>) {
        (self.body.into_bytes(), self.headers.into_content_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TransferSink;

    #[test]
    fn starts_empty() {
        let state = TransferState::new(None);
        assert_eq!(state.http_status(), NO_STATUS);
        assert!(state.body().is_empty());
        assert_eq!(state.declared_mime_type(), None);
    }

    #[test]
    fn sinks_feed_state() {
        let mut state = TransferState::new(None);
        {
            let sinks = state.sinks();
            assert_eq!(sinks.header.observe(b"HTTP/1.1 200 OK\r\n"), 17);
            assert_eq!(sinks.header.observe(b"Content-Type: text/plain\r\n"), 26);
            assert_eq!(sinks.body.observe(b"abc"), 3);
            assert_eq!(sinks.body.observe(b"def"), 3);
        }
        state.set_http_status(200);

        assert_eq!(state.http_status(), 200);
        assert_eq!(state.body().as_bytes(), b"abcdef");
        assert_eq!(state.declared_mime_type(), Some("text/plain"));

        let (body, content_type) = state.into_parts();
        assert_eq!(body, b"abcdef");
        assert_eq!(content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn body_limit_is_applied() {
        let mut state = TransferState::new(Some(4));
        let sinks = state.sinks();
        assert_eq!(sinks.body.observe(b"abc"), 3);
        assert_eq!(sinks.body.observe(b"de"), 0);
    }
}
