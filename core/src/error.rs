use thiserror::Error;

/// Boundary error taxonomy (§6). Every failure a caller or completion
/// callback can observe maps onto one of these.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    #[error("operation invalid in the current connection state")]
    InvalidState,
    #[error("connect called while already connected")]
    AlreadyConnected,
    #[error("operation requires an active connection")]
    NotConnected,
    #[error("topic filter or topic name violates mqtt rules")]
    InvalidTopic,
    #[error("operation timed out waiting for acknowledgement")]
    Timeout,
    #[error("the transport closed unexpectedly")]
    UnexpectedHangup,
    #[error("cancelled because clean_session discards unacknowledged state")]
    CancelledForCleanSession,
    #[error("the connection was destroyed")]
    ConnectionDestroyed,
    #[error("built without websocket support")]
    BuiltWithoutWebsockets,
    #[error("operation is not supported by this client")]
    UnsupportedOperation,
}

/// Top-level error type for fallible entry points (construction, fatal
/// configuration, and wrapped transport/codec errors).
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    Boundary(#[from] ErrorCodeError),
    #[error("keep_alive ({keep_alive_secs}s) must produce a longer period than ping_timeout ({ping_timeout_ms}ms)")]
    KeepAliveTooShort { keep_alive_secs: u16, ping_timeout_ms: u64 },
    #[error("packet codec error: {0}")]
    Codec(#[from] mqttbytes::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out")]
    Elapsed(#[from] tokio::time::error::Elapsed),
}

/// Wraps an [`ErrorCode`] so it can participate in `?` alongside the other
/// `ConnectionError` variants.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(transparent)]
pub struct ErrorCodeError(pub ErrorCode);

impl From<ErrorCode> for ConnectionError {
    fn from(code: ErrorCode) -> Self {
        ConnectionError::Boundary(ErrorCodeError(code))
    }
}
