use thiserror::Error;

/// Error produced by a [`SourceCursor`](crate::source::SourceCursor) pull.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("capacity exceeded: source reports {size} elements, buffer limit is {limit}")]
    CapacityExceeded { size: u64, limit: u64 },
    #[error("source pull failed: {0}")]
    SourcePullFailed(#[source] SourceError),
    #[error("source already released")]
    SourceReleased,
    #[error("source provider panicked before producing a source")]
    ProviderFailed,
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("parse error: {0}")]
    Parse(String),
}
