//! The [`PublishedStorage`] trait: the file-system-like interface a
//! repository publisher writes through.

use std::fmt;
use std::path::Path;

use pubstore_types::ChecksumInfo;
use serde::Serialize;

use crate::error::PublishResult;
use crate::pool::PackagePool;
use crate::progress::Progress;

/// What `link_from_pool` ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LinkOutcome {
    /// The destination already held identical content; nothing was uploaded.
    AlreadyPresent,
    /// Nothing existed at the destination; the file was uploaded.
    Uploaded,
    /// Different content existed and was overwritten (`force`).
    Replaced,
}

/// An object that a recursive removal failed to delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedRemoval {
    pub key: String,
    pub error: String,
}

/// Result of a best-effort recursive removal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    /// Number of objects deleted.
    pub deleted: usize,
    /// Objects that could not be deleted. The sweep does not stop for them.
    pub failed: Vec<FailedRemoval>,
}

impl RemoveReport {
    /// Returns `true` if every listed object was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Published repository storage.
///
/// Paths are logical: slash-separated and relative to the storage root.
/// The `Display` form describes the storage for error messages.
pub trait PublishedStorage: fmt::Display + Send + Sync {
    /// Create a directory. Stores without directories succeed vacuously.
    fn mkdir(&self, path: &str) -> PublishResult<()>;

    /// Upload the local file `source` to `path`, replacing what is there.
    fn put_file(&self, path: &str, source: &Path) -> PublishResult<()>;

    /// Remove a single file. Removing a missing file is an error.
    fn remove(&self, path: &str) -> PublishResult<()>;

    /// Remove everything under the directory `path`.
    ///
    /// Removal is best-effort: individual failures are collected in the
    /// report instead of aborting the sweep. Failing to enumerate the
    /// directory is an error.
    fn remove_dirs(&self, path: &str, progress: &mut dyn Progress) -> PublishResult<RemoveReport>;

    /// Publish `source_path` from `pool` as `published_dir/base_name`.
    ///
    /// If the destination exists with the same MD5 this is a no-op. If it
    /// exists with a different MD5 it is only replaced when `force` is set.
    fn link_from_pool(
        &self,
        published_dir: &str,
        base_name: &str,
        pool: &dyn PackagePool,
        source_path: &str,
        checksums: &ChecksumInfo,
        force: bool,
    ) -> PublishResult<LinkOutcome>;

    /// Every file under directory `prefix`, relative to it.
    fn filelist(&self, prefix: &str) -> PublishResult<Vec<String>>;

    /// Move `old_name` to `new_name`.
    ///
    /// Implementations without a native rename copy and then delete. That
    /// is not atomic: if the delete fails both names exist afterwards, and
    /// callers needing certainty should check the destination themselves.
    /// The source is never deleted unless the copy succeeded.
    fn rename_file(&self, old_name: &str, new_name: &str) -> PublishResult<()>;

    /// Create a symbolic link.
    fn symlink(&self, src: &str, dst: &str) -> PublishResult<()>;

    /// Create a hard link.
    fn hard_link(&self, src: &str, dst: &str) -> PublishResult<()>;

    /// Read the target of a symbolic link.
    fn read_link(&self, path: &str) -> PublishResult<String>;

    /// Returns `true` if a file exists at `path`.
    fn file_exists(&self, path: &str) -> PublishResult<bool>;
}
