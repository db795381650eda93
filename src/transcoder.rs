//! Charset conversion for response bodies.
//!
//! Conversion runs through an `encoding_rs` decoder (and, for targets other
//! than UTF-8, an encoder) into an owned output buffer. Every call of the
//! underlying converter is classified into a [`ConversionStep`], and the
//! driver loop reacts to it: grow the buffer, stop at the end of input, or
//! give up and hand back the caller's bytes untouched.
//!
//! Label lookup follows the WHATWG Encoding Standard, so `ISO-8859-1` and
//! `us-ascii` both resolve to windows-1252.

use encoding_rs::{DecoderResult, Encoding, EncoderResult, UTF_8};
use log::debug;

/// Longest UTF-8 sequence a single decoded character can produce.
const MAX_ENCODED_UNIT_LEN: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum TranscodeError {
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("invalid input sequence after {offset} bytes")]
    InvalidSequence { offset: usize },

    #[error("output buffer size overflow")]
    CapacityOverflow,

    #[error("could not allocate output buffer")]
    OutOfMemory,
}

/// Outcome of one call into the underlying converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConversionStep {
    NeedMoreOutput,
    IncompleteInput,
    InvalidInput,
    Done,
}

struct Progress {
    step: ConversionStep,
    read: usize,
    written: usize,
}

/// Converts `text` from `source_encoding` to `target_encoding`.
///
/// Identical labels (ignoring ASCII case) return a plain copy. Unknown labels,
/// malformed input, characters the target cannot represent and buffer size
/// overflow all return a copy of the original input. A truncated multi-byte
/// sequence at the very end of the input is dropped.
pub fn transcode(text: &[u8], source_encoding: &str, target_encoding: &str) -> Vec<u8> {
    if source_encoding.eq_ignore_ascii_case(target_encoding) {
        return text.to_vec();
    }

    match try_transcode(text, source_encoding, target_encoding, initial_capacity) {
        Ok(converted) => converted,
        Err(e) => {
            debug!(
                "Keeping {} original bytes, {} -> {} failed: {}",
                text.len(),
                source_encoding,
                target_encoding,
                e
            );
            text.to_vec()
        }
    }
}

fn try_transcode<C>(
    text: &[u8],
    source_label: &str,
    target_label: &str,
    capacity_for: C,
) -> Result<Vec<u8>, TranscodeError>
where
    C: Fn(usize) -> Result<usize, TranscodeError>,
{
    let source = lookup_encoding(source_label)?;
    let target = lookup_encoding(target_label)?;

    // encoding_rs silently swaps utf-16 and friends for utf-8 when encoding.
    if target.output_encoding() != target {
        return Err(TranscodeError::UnsupportedEncoding(target_label.to_string()));
    }

    let utf8 = decode_to_utf8(text, source, capacity_for(text.len())?)?;
    if target == UTF_8 {
        return Ok(utf8);
    }

    let utf8 = String::from_utf8(utf8).map_err(|e| TranscodeError::InvalidSequence {
        offset: e.utf8_error().valid_up_to(),
    })?;
    encode_from_utf8(&utf8, target, capacity_for(utf8.len())?)
}

fn lookup_encoding(label: &str) -> Result<&'static Encoding, TranscodeError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| TranscodeError::UnsupportedEncoding(label.to_string()))
}

fn decode_to_utf8(
    text: &[u8],
    source: &'static Encoding,
    capacity: usize,
) -> Result<Vec<u8>, TranscodeError> {
    let mut decoder = source.new_decoder_without_bom_handling();
    drive(capacity, |offset, dst, last| {
        let (result, read, written) =
            decoder.decode_to_utf8_without_replacement(&text[offset..], dst, last);
        let step = match result {
            DecoderResult::InputEmpty => ConversionStep::Done,
            DecoderResult::OutputFull => ConversionStep::NeedMoreOutput,
            // Once all input has been fed, the only thing left to be malformed
            // is a sequence cut off by the end of the body.
            DecoderResult::Malformed(_, _) if last => ConversionStep::IncompleteInput,
            DecoderResult::Malformed(_, _) => ConversionStep::InvalidInput,
        };
        Progress {
            step,
            read,
            written,
        }
    })
}

fn encode_from_utf8(
    text: &str,
    target: &'static Encoding,
    capacity: usize,
) -> Result<Vec<u8>, TranscodeError> {
    let mut encoder = target.new_encoder();
    drive(capacity, |offset, dst, last| {
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(&text[offset..], dst, last);
        let step = match result {
            EncoderResult::InputEmpty => ConversionStep::Done,
            EncoderResult::OutputFull => ConversionStep::NeedMoreOutput,
            EncoderResult::Unmappable(_) => ConversionStep::InvalidInput,
        };
        Progress {
            step,
            read,
            written,
        }
    })
}

/// Runs `convert` until the input is used up, growing the output as needed.
///
/// `convert` receives the input offset to resume from, the unused part of the
/// output buffer, and whether this is the final (flushing) call.
fn drive<F>(capacity: usize, mut convert: F) -> Result<Vec<u8>, TranscodeError>
where
    F: FnMut(usize, &mut [u8], bool) -> Progress,
{
    let mut output = OutputBuffer::with_capacity(capacity)?;
    let mut offset = 0usize;
    let mut last = false;

    loop {
        let progress = convert(offset, output.spare_mut(), last);
        offset += progress.read;
        output.advance(progress.written);

        match progress.step {
            ConversionStep::NeedMoreOutput => output.grow()?,
            ConversionStep::Done if !last => {
                // All input consumed; one more call flushes converter state.
                last = true;
            }
            ConversionStep::Done | ConversionStep::IncompleteInput => {
                return Ok(output.into_bytes());
            }
            ConversionStep::InvalidInput => {
                return Err(TranscodeError::InvalidSequence { offset });
            }
        }
    }
}

fn initial_capacity(input_len: usize) -> Result<usize, TranscodeError> {
    input_len
        .checked_mul(MAX_ENCODED_UNIT_LEN)
        .and_then(|len| len.checked_add(1))
        .ok_or(TranscodeError::CapacityOverflow)
}

fn doubled_capacity(current: usize) -> Result<usize, TranscodeError> {
    match current.checked_mul(2) {
        Some(doubled) if doubled > current => Ok(doubled),
        _ => Err(TranscodeError::CapacityOverflow),
    }
}

struct OutputBuffer {
    buf: Vec<u8>,
    written: usize,
}

impl OutputBuffer {
    fn with_capacity(capacity: usize) -> Result<Self, TranscodeError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| TranscodeError::OutOfMemory)?;
        buf.resize(capacity, 0);
        Ok(Self { buf, written: 0 })
    }

    fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.written..]
    }

    fn advance(&mut self, len: usize) {
        self.written += len;
    }

    fn grow(&mut self) -> Result<(), TranscodeError> {
        let new_capacity = doubled_capacity(self.buf.len())?;
        self.buf
            .try_reserve_exact(new_capacity - self.buf.len())
            .map_err(|_| TranscodeError::OutOfMemory)?;
        self.buf.resize(new_capacity, 0);
        Ok(())
    }

    fn into_bytes(mut self) -> Vec<u8> {
        self.buf.truncate(self.written);
        self.buf
    }
}
