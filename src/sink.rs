/// Receives the data stream of a transfer, one piece at a time.
///
/// A transfer engine calls `observe` for every body chunk or raw header line
/// it receives. Returning fewer bytes than were passed in tells the engine to
/// abort the transfer.
pub trait TransferSink {
    fn observe(&mut self, data: &[u8]) -> usize;
}

impl<F> TransferSink for F
where
    F: FnMut(&[u8]) -> usize,
{
    fn observe(&mut self, data: &[u8]) -> usize {
        self(data)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("sink accepted {consumed} of {len} bytes")]
pub struct SinkAborted {
    pub consumed: usize,
    pub len: usize,
}

/// Hands `data` to `sink`, turning a short count into an `io::Error` that
/// wraps [`SinkAborted`].
pub fn deliver(sink: &mut dyn TransferSink, data: &[u8]) -> std::io::Result<()> {
    let consumed = sink.observe(data);
    if consumed != data.len() {
        return Err(std::io::Error::other(SinkAborted {
            consumed,
            len: data.len(),
        }));
    }
    Ok(())
}

pub fn is_sink_aborted(error: &std::io::Error) -> bool {
    error
        .get_ref()
        .map(|inner| inner.is::<SinkAborted>())
        .unwrap_or(false)
}
