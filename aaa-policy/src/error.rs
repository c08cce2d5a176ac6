use std::fmt;

/// Errors surfaced by the policy-engine adapter.
///
/// Shape copied from `r2e-openfga::OpenFgaError`: a plain enum, manual
/// `Display`, and targeted `From` impls from the transport's error types —
/// no `thiserror`, matching the teacher crate's style exactly.
#[derive(Debug)]
pub enum PolicyEngineError {
    ConnectionFailed(String),
    ServerError(String),
    Timeout,
    InvalidConfig(String),
    Unsupported(String),
}

impl fmt::Display for PolicyEngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEngineError::ConnectionFailed(msg) => write!(f, "policy engine connection failed: {msg}"),
            PolicyEngineError::ServerError(msg) => write!(f, "policy engine server error: {msg}"),
            PolicyEngineError::Timeout => write!(f, "policy engine request timed out"),
            PolicyEngineError::InvalidConfig(msg) => write!(f, "invalid policy engine config: {msg}"),
            PolicyEngineError::Unsupported(msg) => write!(f, "unsupported policy engine operation: {msg}"),
        }
    }
}

impl std::error::Error for PolicyEngineError {}

impl From<tonic::transport::Error> for PolicyEngineError {
    fn from(err: tonic::transport::Error) -> Self {
        PolicyEngineError::ConnectionFailed(err.to_string())
    }
}

impl From<tonic::Status> for PolicyEngineError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => PolicyEngineError::Timeout,
            _ => PolicyEngineError::ServerError(status.message().to_string()),
        }
    }
}
