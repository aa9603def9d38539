use thiserror::Error;

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing configuration: {0}")]
    Config(String),
    #[error("Exchange error {code}: {message}")]
    Exchange { code: i64, message: String },
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TrackerError::Timeout(err.to_string())
        } else {
            TrackerError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TrackerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TrackerError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Parse(err.to_string())
    }
}

impl From<fantoccini::error::CmdError> for TrackerError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        match err {
            fantoccini::error::CmdError::WaitTimeout => {
                TrackerError::Timeout("element did not appear".to_owned())
            }
            other => TrackerError::Transport(other.to_string()),
        }
    }
}

impl From<fantoccini::error::NewSessionError> for TrackerError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        TrackerError::Transport(err.to_string())
    }
}
