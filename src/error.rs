//! Scan and show configuration errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("show {0} not found")]
    ShowNotFound(i64),

    #[error("a scan is already running")]
    AlreadyScanning,

    #[error("search failed: {0}")]
    SearchTransientFailure(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("invalid episode configuration: {0}")]
    InvalidEpisodeConfig(String),
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Repository errors travel as `anyhow::Error`. A `ScanError` raised below
/// the repository boundary is recovered as-is, anything else is treated as
/// a storage failure.
impl From<anyhow::Error> for ScanError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ScanError>() {
            Ok(scan_err) => scan_err,
            Err(err) => ScanError::PersistenceFailure(format!("{:#}", err)),
        }
    }
}
