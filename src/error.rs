// src/error.rs
//
// Error taxonomy (spec §7) and the crate-level `Result` alias. Configuration
// and authentication failures are fatal to the top-level caller; record-access
// (`Process`) and artifact failures are recoverable per-record and drive the
// retry loop in `batch.rs`. `Io` wraps filesystem failures surfaced via `?`.

use thiserror::Error;

/// Fatal-vs-recoverable error taxonomy for the scraper/automator.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration — fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad credentials, locked account, or unconfirmed login — fatal for the
    /// whole session.
    #[error("authentication error: {0}")]
    Login(String),

    /// Network failure or unreachable record — recoverable per-record.
    #[error("process error: {0}")]
    Process(String),

    /// Missing frame/link/form, unresolved download URL, oversized/empty
    /// download, or a portal-reported diagnostic — recoverable per-record.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Filesystem I/O failure surfaced through `?`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the batch orchestrator should retry after this error. Only
    /// per-record access and artifact errors are recoverable; configuration,
    /// authentication, and I/O errors stop the attempt immediately.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Process(_) | Error::Artifact(_))
    }
}

/// Crate-level result alias carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
