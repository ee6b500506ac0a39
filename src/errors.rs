use crate::models::params::SamplingMethod;

/// Error taxonomy for the simulation engine and its collaborators.
/// Every failure is surfaced to the caller. Bad input is never clamped
/// and no estimate is ever returned as NaN/Infinity.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("insufficient samples: {requested} requested yields no usable draws under {method}")]
    InsufficientSamples {
        method: SamplingMethod,
        requested: usize,
    },

    #[error("random generator exhausted")]
    GeneratorExhausted,

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("io error: {0}")]
    Io(String),
}

impl EngineError {
    /// Caller-side errors (bad parameters or sample budget) as opposed to
    /// service failures.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidParams(_) | EngineError::InsufficientSamples { .. }
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
