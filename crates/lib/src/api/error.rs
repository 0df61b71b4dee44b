/// Failure of a remote call. Local validation failures live in `SessionError`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport failure: connect refused, DNS, TLS, body read.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx status, or a content type that is not `application/json`. `body` is the raw text.
    #[error("server returned {status} ({content_type}): {body}")]
    Protocol {
        status: u16,
        content_type: String,
        body: String,
    },

    /// JSON parsed (or failed to) but the fields the dialect expects are absent.
    #[error("unexpected response format: {0}")]
    Format(String),
}

impl ApiError {
    /// Short line for the error overlay.
    pub fn summary(&self) -> String {
        match self {
            ApiError::Network(e) => format!("network error: {}", e),
            ApiError::Protocol { status, body, .. } => {
                let body = body.trim();
                if body.is_empty() {
                    format!("server returned {}", status)
                } else {
                    let short: String = body.chars().take(200).collect();
                    format!("server returned {}: {}", status, short)
                }
            }
            ApiError::Format(m) => format!("unexpected response format: {}", m),
        }
    }
}
