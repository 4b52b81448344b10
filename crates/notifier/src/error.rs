use thiserror::Error;

/// Failure of a single provider send.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, TLS failure or timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response. `body` is the provider's raw error payload.
    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// 2xx response without a usable message id.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Cloud API error codes reserved for template problems (unknown name,
/// parameter mismatch, paused or disabled template).
const TEMPLATE_ERROR_CODES: std::ops::Range<u64> = 132_000..133_000;

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Transport(e) if e.is_timeout())
    }

    /// Whether the provider refused the message because of its template,
    /// in which case the same content can still go out as plain text.
    pub fn is_template_unsupported(&self) -> bool {
        let ProviderError::Rejected { body, .. } = self else {
            return false;
        };

        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["code"].as_u64())
            .is_some_and(|code| TEMPLATE_ERROR_CODES.contains(&code))
    }
}
