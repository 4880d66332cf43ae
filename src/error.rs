pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("future already retrieved")]
    FutureAlreadyRetrieved,

    #[error("task not yet executed")]
    NotExecuted,

    #[error("task has no result value")]
    NoResult,

    #[error("task result is not of the requested type")]
    TypeMismatch,

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("result channel disconnected before the task finished")]
    Disconnected,

    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("worker id space exhausted")]
    WorkerIdsExhausted,

    #[error("pool manager not initialized")]
    NotInitialized,

    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn task_failed<S: Into<String>>(msg: S) -> Self {
        Error::TaskFailed(msg.into())
    }

    /// True for errors caused by calling an API out of order rather than
    /// by the task itself.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::FutureAlreadyRetrieved | Error::NotExecuted | Error::NoResult | Error::TypeMismatch
        )
    }
}
