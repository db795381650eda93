use log::debug;

use crate::fetch_result::FetchResult;
use crate::transcoder::transcode;
use crate::transfer_state::TransferState;

pub const TRANSPORT_FAILURE_STATUS: i32 = -1;

const CHARSET_PARAM: &str = "charset=";

/// Turns a finished transfer into the caller-facing result.
///
/// Mime type, charset and text are only reported when a status was obtained
/// and a body was received. A declared non-empty charset is used to convert
/// the body to UTF-8; otherwise the body is taken as UTF-8 already.
pub fn encode(status: i32, state: TransferState) -> FetchResult {
    if status == TRANSPORT_FAILURE_STATUS || state.body().is_empty() {
        return FetchResult::status_only(status);
    }

    let (body, content_type) = state.into_parts();
    let (mime_type, charset) = match content_type.as_deref() {
        Some(content_type) => (
            Some(extract_mime_type(content_type)),
            extract_charset(content_type),
        ),
        None => (None, None),
    };

    let text = match charset.as_deref() {
        Some(charset) if !charset.is_empty() => {
            debug!("Converting {} body bytes from {}", body.len(), charset);
            transcode(&body, charset, "utf-8")
        }
        _ => body,
    };

    let response_text = match String::from_utf8(text) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };

    FetchResult {
        status,
        mime_type,
        charset,
        response_text: Some(response_text),
    }
}

/// Value of the `charset=` parameter, without quotes or surrounding spaces.
///
/// An empty string means the parameter was present without a value.
pub fn extract_charset(content_type: &str) -> Option<String> {
    let start = content_type
        .to_ascii_lowercase()
        .find(CHARSET_PARAM)?
        + CHARSET_PARAM.len();
    let value = &content_type[start..];
    let value = value.strip_prefix('"').unwrap_or(value);
    let end = value.find(|c: char| c == '"' || c == ';').unwrap_or(value.len());
    Some(value[..end].trim().to_string())
}

/// Everything before the first space or `;`, possibly empty.
pub fn extract_mime_type(content_type: &str) -> String {
    let end = content_type
        .find(|c: char| c == ' ' || c == ';')
        .unwrap_or(content_type.len());
    content_type[..end].to_string()
}
