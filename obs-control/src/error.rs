use interfaces::defs::ControllerError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum ObsError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid OBS URI: {0}")]
    InvalidUri(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{request_type} failed with code {code}: {comment}")]
    RequestFailed {
        request_type: String,
        code: u16,
        comment: String,
    },

    #[error("Connection closed ({code}): {reason}")]
    Closed { code: u16, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl ObsError {
    /// True when the socket can no longer carry requests.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            ObsError::WebSocket(_) | ObsError::Closed { .. } | ObsError::NotConnected
        )
    }

    pub fn into_query_error(self) -> ControllerError {
        if self.is_connection_lost() {
            ControllerError::Unavailable
        } else {
            ControllerError::Query(self.to_string())
        }
    }

    pub fn into_switch_error(self) -> ControllerError {
        if self.is_connection_lost() {
            ControllerError::Unavailable
        } else {
            ControllerError::Switch(self.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ObsError>;
