use thiserror::Error;

/// Crate-wide error type for the ledger/post data engine and the sync client.
///
/// One variant per distinguishable failure surface. Duplicate posts and a
/// ledger load-skip are deliberately absent here: both are recovered
/// locally rather than surfaced as errors that cross an API boundary.
#[derive(Debug, Error, Clone)]
pub enum HydraError {
    #[error("bad server endpoint: {0}")]
    BadEndpoint(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("heartbeat expired, server presumed dead")]
    HeartbeatExpired,

    #[error("peer rejected command: {0}")]
    ProtocolInvalid(String),

    #[error("server-internal error")]
    ServerInternal,

    #[error("io error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("value out of range")]
    OutOfRange,

    #[error("actor already shut down")]
    Shutdown,
}

impl From<std::io::Error> for HydraError {
    fn from(e: std::io::Error) -> Self {
        HydraError::Io(e.to_string())
    }
}
