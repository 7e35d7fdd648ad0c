use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum MoonrakerError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("Malformed response: {message}")]
    Decode { message: String },

    #[error("Invalid endpoint: {message}")]
    Endpoint { message: String },
}

impl MoonrakerError {
    pub fn decode(message: impl Into<String>) -> Self {
        MoonrakerError::Decode {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            MoonrakerError::Transport { .. } => true,
            MoonrakerError::Status { status, .. } => status.is_server_error(),
            MoonrakerError::Decode { .. } | MoonrakerError::Endpoint { .. } => false,
        }
    }
}

impl From<serde_json::Error> for MoonrakerError {
    fn from(e: serde_json::Error) -> Self {
        MoonrakerError::decode(e.to_string())
    }
}

impl From<url::ParseError> for MoonrakerError {
    fn from(e: url::ParseError) -> Self {
        MoonrakerError::Endpoint {
            message: e.to_string(),
        }
    }
}
