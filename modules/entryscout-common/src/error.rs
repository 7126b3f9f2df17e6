use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Errors that abort a run before or after harvesting. Everything that can go
/// wrong while harvesting a subject is reported through tagged outcomes instead.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Subject list error: {0}")]
    SubjectLoad(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
