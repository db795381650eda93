use serde::Serialize;

/// Outcome of one fetch as handed back to the caller.
///
/// `status` is `-1` when the transfer itself failed. `response_text` is set
/// whenever a response body was received, even if it converts to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub status: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

impl FetchResult {
    pub fn status_only(status: i32) -> Self {
        Self {
            status,
            mime_type: None,
            charset: None,
            response_text: None,
        }
    }

    /// The response text, empty when no body was received.
    pub fn text(&self) -> &str {
        self.response_text.as_deref().unwrap_or_default()
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status < 0
    }
}
