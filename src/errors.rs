use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("DECODE_FAILED: line {line}: {reason}")]
    Decode { line: usize, reason: String },
    #[error("LEGACY_READ_FAILED: {0}")]
    LegacyRead(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NAME_COLLISION: {0}")]
    NameCollision(String),
    #[error("INVALID_NAME: {0}")]
    InvalidName(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
}

impl AppError {
    pub fn decode(line: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            line,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::LegacyRead(value.to_string())
    }
}

impl From<serde_pickle::Error> for AppError {
    fn from(value: serde_pickle::Error) -> Self {
        Self::LegacyRead(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
