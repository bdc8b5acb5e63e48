use crate::models::upload::{TransferPath, UploadStatus};
use thiserror::Error;

/// Everything the upload client can report. None of these is retried
/// automatically.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("token issuance failed: {message}")]
    TokenIssuance {
        message: String,
        trace: Option<String>,
    },
    #[error("{path} transfer failed: {message}")]
    Transfer {
        path: TransferPath,
        message: String,
        trace: Option<String>,
    },
    #[error("listing failed: {message}")]
    Listing {
        message: String,
        trace: Option<String>,
    },
    #[error("file is empty")]
    EmptyPayload,
    #[error("file is {size} bytes, direct transfers are limited to {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("file name is required for a proxied transfer")]
    MissingFileName,
    #[error("access token for `{0}` has expired, request a new one")]
    TokenExpired(String),
    #[error("no file selected")]
    NoFileSelected,
    #[error("cannot {action} while {status}")]
    InvalidState {
        status: UploadStatus,
        action: &'static str,
    },
    #[error("attempt was superseded by a new file selection")]
    Superseded,
}

impl UploadError {
    pub fn token_issuance(message: impl Into<String>) -> Self {
        UploadError::TokenIssuance {
            message: message.into(),
            trace: None,
        }
    }

    pub(crate) fn token_issuance_from(err: &reqwest::Error) -> Self {
        UploadError::TokenIssuance {
            message: err.to_string(),
            trace: Some(error_chain(err)),
        }
    }

    pub(crate) fn transfer(path: TransferPath, message: impl Into<String>) -> Self {
        UploadError::Transfer {
            path,
            message: message.into(),
            trace: None,
        }
    }

    pub(crate) fn transfer_from(path: TransferPath, err: &reqwest::Error) -> Self {
        UploadError::Transfer {
            path,
            message: err.to_string(),
            trace: Some(error_chain(err)),
        }
    }

    pub(crate) fn listing(message: impl Into<String>) -> Self {
        UploadError::Listing {
            message: message.into(),
            trace: None,
        }
    }

    pub(crate) fn listing_from(err: &reqwest::Error) -> Self {
        UploadError::Listing {
            message: err.to_string(),
            trace: Some(error_chain(err)),
        }
    }

    /// Diagnostic detail beyond the message, when the failure carried one.
    pub fn trace(&self) -> Option<&str> {
        match self {
            UploadError::TokenIssuance { trace, .. }
            | UploadError::Transfer { trace, .. }
            | UploadError::Listing { trace, .. } => trace.as_deref(),
            _ => None,
        }
    }

    /// Human-readable status line: the message, plus the trace if present.
    pub fn status_text(&self) -> String {
        match self.trace() {
            Some(trace) => format!("{}\n{}", self, trace),
            None => self.to_string(),
        }
    }
}

/// Render an error and its `source()` chain, one cause per line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = format!("{:?}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_appends_trace() {
        let err = UploadError::TokenIssuance {
            message: "connection refused".into(),
            trace: Some("at connect".into()),
        };
        assert_eq!(
            err.status_text(),
            "token issuance failed: connection refused\nat connect"
        );
        assert_eq!(
            UploadError::transfer(TransferPath::Proxied, "403 Forbidden").status_text(),
            "proxied transfer failed: 403 Forbidden"
        );
    }

    #[test]
    fn precondition_errors_carry_no_trace() {
        let err = UploadError::PayloadTooLarge {
            size: 300_000,
            limit: 256_000,
        };
        assert!(err.trace().is_none());
        assert!(err.to_string().contains("300000"));
    }
}
