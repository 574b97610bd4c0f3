//! Error types of the dispatch layer.
//!
//! [`DispatchError`] folds the two non-success channels of a dispatch into
//! one enum: `OperationFailed` is the expected, recoverable "operation
//! failed" channel, every other variant is a terminal transport exception.
//! [`PollError`] is deliberately separate so callers can tell "gave up
//! waiting" apart from "operation failed".

use std::time::Duration;

use thiserror::Error;

/// The outcome of a dispatch that did not succeed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The server processed the request and reported a failure, or the
    /// payload could not be decoded. Expected and recoverable.
    #[error("operation failed: {description}")]
    OperationFailed { description: String },

    /// 401, 403 or an opaque network-layer denial.
    #[error("authentication required (status {status})")]
    AuthenticationRequired { status: u16 },

    /// 404: no management interface at the configured endpoint.
    #[error("management interface at '{url}' not found")]
    InterfaceNotFound { url: String },

    /// 503: the process is (re)starting and not yet serving requests.
    #[error("service temporarily unavailable; is the process still starting?")]
    ServiceUnavailable,

    /// Any status outside the classification table, with a diagnostic dump
    /// of the request and the raw response body.
    #[error("unexpected status {status} for {request}: {body}")]
    UnexpectedStatus {
        status: u16,
        request: String,
        body: String,
    },

    /// The request could not be issued or the response never arrived.
    #[error("communication error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    /// The request is malformed and was never sent.
    #[error("malformed request: {reason}")]
    InvalidRequest { reason: String },
}

impl DispatchError {
    /// Whether this is the expected operation-failure channel (as opposed to
    /// a transport exception).
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, DispatchError::OperationFailed { .. })
    }

    /// Whether this is a terminal transport exception.
    pub fn is_transport(&self) -> bool {
        !self.is_operation_failure()
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::OperationFailed { .. } => "operation_failed",
            DispatchError::AuthenticationRequired { .. } => "authentication_required",
            DispatchError::InterfaceNotFound { .. } => "interface_not_found",
            DispatchError::ServiceUnavailable => "service_unavailable",
            DispatchError::UnexpectedStatus { .. } => "unexpected_status",
            DispatchError::Transport { .. } => "transport",
            DispatchError::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// Terminal outcomes of a poll session.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PollError {
    /// The overall timeout elapsed before the condition held. The polled
    /// operation may still be pending on the server.
    #[error("condition not satisfied within {timeout:?}")]
    Timeout { timeout: Duration },

    /// The caller cancelled the poll session.
    #[error("polling cancelled")]
    Cancelled,
}

/// Raised when a download URL cannot be built.
#[derive(Debug, Error)]
pub enum UrlError {
    /// Extra parameters must come in key/value pairs.
    #[error("uneven number of extra parameters ({count})")]
    UnevenParameters { count: usize },

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },
}
