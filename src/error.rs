use std::path::PathBuf;

use crate::compress::CodecError;

/// The primary error type for all operations in the `hotsync` crate.
#[derive(Debug)]
pub enum SyncError {
    /// A request to the CDN failed: connection error, timeout or a non-2xx status.
    /// These are the only errors the retry combinator will try again.
    Network { url: String, status: Option<u16>, reason: String },

    /// Bytes on disk (or freshly downloaded) do not hash to the value the catalog records.
    Integrity { path: PathBuf, expected: String, actual: String },

    /// A codec input was malformed or truncated inconsistently with its declared size.
    CorruptStream(String),

    /// The logical path is absent from the active catalog.
    NotFound { path: String },

    /// An I/O error occurred, typically while reading or writing a cache file.
    /// Includes the path where the error happened.
    Io { source: std::io::Error, path: PathBuf },

    /// An error during serialization or deserialization of catalog or gamedata JSON.
    SerdeJson(serde_json::Error),

    /// A catalog snapshot could not be fetched or parsed. Fatal for the run.
    Catalog { res_version: String, reason: String },

    /// An external collaborator (container reader, schema compiler) failed.
    Collaborator { tool: String, reason: String },

    /// A job needed the asset index but `asset_index` did not publish one this run.
    IndexUnavailable,

    /// The run was interrupted before it finished.
    Interrupted,

    /// A wrapper for any other error that doesn't fit the specific variants.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl SyncError {
    /// Attaches a path to an I/O error.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io { source, path: path.into() }
    }

    pub fn collaborator(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Collaborator { tool: tool.into(), reason: reason.into() }
    }

    /// Whether a failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network { .. })
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Network { url, status: Some(status), reason } => write!(f, "Request to '{}' failed with HTTP {}: {}", url, status, reason),
            SyncError::Network { url, status: None, reason } => write!(f, "Request to '{}' failed: {}", url, reason),
            SyncError::Integrity { path, expected, actual } => write!(f, "Hash mismatch for '{}': expected {}, got {}", path.display(), expected, actual),
            SyncError::CorruptStream(msg) => write!(f, "Corrupt stream: {}", msg),
            SyncError::NotFound { path } => write!(f, "'{}' is not listed in the active catalog", path),
            SyncError::Io { source, path } => write!(f, "I/O error on path '{}': {}", path.display(), source),
            SyncError::SerdeJson(e) => write!(f, "Serialization error: {}", e),
            SyncError::Catalog { res_version, reason } => write!(f, "Failed to load catalog for res_version {}: {}", res_version, reason),
            SyncError::Collaborator { tool, reason } => write!(f, "{} failed: {}", tool, reason),
            SyncError::IndexUnavailable => write!(f, "The asset index was not loaded in this run"),
            SyncError::Interrupted => write!(f, "Interrupted"),
            SyncError::Other(e) => write!(f, "An unexpected error occurred: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Io { source, .. } => Some(source),
            SyncError::SerdeJson(e) => Some(e),
            SyncError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerdeJson(err)
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        SyncError::CorruptStream(err.to_string())
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        SyncError::CorruptStream(format!("transport archive: {}", err))
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Other(Box::new(err))
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io { source: err, path: PathBuf::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        let net = SyncError::Network { url: "http://cdn/x".into(), status: Some(503), reason: "unavailable".into() };
        assert!(net.is_retryable());
        assert!(!SyncError::NotFound { path: "a.ab".into() }.is_retryable());
        assert!(!SyncError::CorruptStream("short".into()).is_retryable());
        assert!(!SyncError::Integrity { path: "x".into(), expected: "a".into(), actual: "b".into() }.is_retryable());
    }

    #[test]
    fn display_includes_status_when_known() {
        let net = SyncError::Network { url: "http://cdn/x".into(), status: Some(404), reason: "Not Found".into() };
        assert_eq!(net.to_string(), "Request to 'http://cdn/x' failed with HTTP 404: Not Found");
    }
}
