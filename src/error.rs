use thiserror::Error;

/// Result type for Heatzy operations
pub type Result<T> = std::result::Result<T, HeatzyError>;

/// Errors that can occur when talking to the Heatzy websocket service
#[derive(Error, Debug)]
pub enum HeatzyError {
    /// The websocket could not be opened, or the transport reported a fatal error
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Login was rejected, or a follow-up operation at connect time failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Protocol-level fault: not connected, or the connection was closed
    #[error("WebSocket error: {0}")]
    Websocket(String),

    /// The device model does not support the requested operation
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// No device with this id is registered in the session
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The auth collaborator failed to answer a request
    #[error("Request failed: {0}")]
    Request(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeatzyError {
    /// Whether this error ends the session and requires a new `connect`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::AuthenticationFailed(_) | Self::Websocket(_)
        )
    }
}
