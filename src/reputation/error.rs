use thiserror::Error;

/// Classified failure of a reputation check.
///
/// Transient errors may succeed if the caller tries again later; fatal ones
/// will not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("reputation check timed out")]
    Timeout,

    #[error("rate limited by reputation provider")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("analysis is still queued at the reputation provider")]
    AnalysisPending,

    #[error("reputation provider unavailable (HTTP {0})")]
    Upstream(u16),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("reputation provider rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed reputation provider response: {0}")]
    MalformedResponse(String),
}

impl CheckError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CheckError::Timeout
                | CheckError::RateLimited
                | CheckError::Network(_)
                | CheckError::AnalysisPending
                | CheckError::Upstream(_)
        )
    }
}

impl From<reqwest::Error> for CheckError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CheckError::Timeout
        } else if e.is_decode() {
            CheckError::MalformedResponse(e.to_string())
        } else {
            CheckError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CheckError::Timeout.is_transient());
        assert!(CheckError::RateLimited.is_transient());
        assert!(CheckError::Upstream(503).is_transient());
        assert!(CheckError::AnalysisPending.is_transient());

        assert!(!CheckError::InvalidUrl("x".into()).is_transient());
        assert!(!CheckError::MalformedResponse("x".into()).is_transient());
        assert!(!CheckError::Rejected {
            status: 401,
            message: "bad key".into()
        }
        .is_transient());
    }
}
