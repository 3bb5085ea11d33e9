//! Error types for published-storage operations.

use pubstore_store::StoreError;
use thiserror::Error;

/// Errors that can occur while publishing to a blob store.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A local source file could not be opened or read.
    #[error("error opening {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Uploading content to the store failed.
    #[error("error uploading {source_path} to {storage}: {key}: {source}")]
    Upload {
        source_path: String,
        storage: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Any other request to the store failed.
    #[error("error {op} {path} in {storage}: {source}")]
    Remote {
        op: &'static str,
        path: String,
        storage: String,
        #[source]
        source: StoreError,
    },

    /// The copy of a rename succeeded but the source could not be removed.
    /// Both objects now exist.
    #[error("renamed {old_key} to {new_key} but could not remove the source: {source}")]
    RenameIncomplete {
        old_key: String,
        new_key: String,
        #[source]
        source: StoreError,
    },

    /// The caller supplied no usable MD5 for a file that already exists
    /// remotely, so the two cannot be compared.
    #[error("unable to compare object {key}, MD5 checksum missing")]
    MissingSourceChecksum { key: String },

    /// The remote object reports no usable MD5 (e.g. a composite object).
    #[error("no MD5 checksum on remote file {key}; is it a composite object?")]
    MissingRemoteChecksum { key: String },

    /// A different file already exists at the destination.
    #[error("error putting file to {key}: file already exists and is different: {storage}")]
    DestinationConflict { key: String, storage: String },

    /// The store cannot express the requested operation.
    #[error("{storage} doesn't support {operation}")]
    Unsupported {
        operation: &'static str,
        storage: String,
    },

    /// The backend could not be constructed.
    #[error("unable to connect to {storage}: {source}")]
    Connect {
        storage: String,
        #[source]
        source: StoreError,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PublishError {
    /// Returns `true` for the checksum-unavailable family of errors.
    pub fn is_checksum_unavailable(&self) -> bool {
        matches!(
            self,
            PublishError::MissingSourceChecksum { .. } | PublishError::MissingRemoteChecksum { .. }
        )
    }

    /// The store error underneath, if this error came from the store.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            PublishError::Upload { source, .. }
            | PublishError::Remote { source, .. }
            | PublishError::RenameIncomplete { source, .. }
            | PublishError::Connect { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience type alias for publish operations.
pub type PublishResult<T> = std::result::Result<T, PublishError>;
