use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Cluster unreachable: {0}")]
    Unreachable(String),

    #[error("Cluster not ready: {0}")]
    NotReady(String),

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed status document: {0}")]
    MalformedStatus(String),

    #[error("Bootstrap cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

impl BootstrapError {
    /// Errors that may resolve on their own while the cluster converges.
    ///
    /// The readiness poller keeps retrying these until its deadline; everything
    /// else aborts the poll immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::NotReady(_) | Self::Io(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
