use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl BrowserlessError {
    /// True when Browserless gave up waiting (navigation or selector wait),
    /// or the HTTP request itself timed out.
    pub fn is_timeout(&self) -> bool {
        match self {
            BrowserlessError::Timeout(_) => true,
            BrowserlessError::Api { status, .. } => *status == 408,
            BrowserlessError::Network(_) => false,
        }
    }
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserlessError::Timeout(err.to_string())
        } else {
            BrowserlessError::Network(err.to_string())
        }
    }
}
