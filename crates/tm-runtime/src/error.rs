use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};
use tm_core::error::CoreReason;

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum RuntimeReason {
    #[error("bootstrap error")]
    Bootstrap,
    #[error("formula error")]
    Formula,
    #[error("input error")]
    Input,
    #[error("shuffle backpressure timeout")]
    ShuffleBackpressure,
    #[error("run aborted")]
    Aborted,
    #[error("shutdown error")]
    Shutdown,
    #[error("{0}")]
    Core(CoreReason),
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for RuntimeReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Bootstrap => 2001,
            Self::Shutdown => 2002,
            Self::Formula => 2003,
            Self::Input => 2004,
            Self::ShuffleBackpressure => 2005,
            Self::Aborted => 2006,
            Self::Core(c) => c.error_code(),
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type RuntimeError = StructError<RuntimeReason>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;
