use thiserror::Error;

/// Failures talking to a delivery provider.
///
/// These never reach the HTTP caller: push failures become per-message
/// error results, SMS failures are logged and recorded.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider rejected request: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NotifierError::Status {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "provider returned HTTP 503: upstream unavailable");

        let err = NotifierError::MalformedResponse("expected 100 tickets, got 99".to_string());
        assert_eq!(
            err.to_string(),
            "malformed provider response: expected 100 tickets, got 99"
        );
    }
}
