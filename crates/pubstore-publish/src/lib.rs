//! Published storage for package repositories on flat blob stores.
//!
//! A repository publisher expects a file system: directories, renames,
//! links. A blob bucket has none of those. [`BlobPublishedStorage`] emulates
//! what can be emulated on top of any [`BlobStore`](pubstore_store::BlobStore)
//! and refuses the rest:
//!
//! - directories are key prefixes; `mkdir` is a no-op and recursive removal
//!   is a prefix scan followed by per-object deletes
//! - rename is copy-then-delete (not atomic, see [`PublishedStorage::rename_file`])
//! - linking from the package pool is an upload guarded by an MD5 comparison,
//!   so re-publishing unchanged packages uploads nothing
//! - symbolic and hard links are unsupported and always fail
//!
//! # Modules
//!
//! - [`backend`]: [`BlobPublishedStorage`], the blob-store backed implementation
//! - [`traits`]: [`PublishedStorage`], the interface the publisher consumes
//! - [`pool`]: [`PackagePool`] source of package content
//! - [`progress`]: [`Progress`] reporting for bulk operations
//! - [`config`]: [`StorageConfig`] loaded from TOML
//! - [`error`]: [`PublishError`]

pub mod backend;
pub mod config;
pub mod error;
pub mod pool;
pub mod progress;
pub mod traits;

pub use backend::{BlobPublishedStorage, DEFAULT_PAGE_SIZE, DEFAULT_PROGRESS_BATCH};
pub use config::StorageConfig;
pub use error::{PublishError, PublishResult};
pub use pool::{LocalPackagePool, PackagePool};
pub use progress::{LogProgress, NullProgress, Progress, ProgressBar};
pub use traits::{FailedRemoval, LinkOutcome, PublishedStorage, RemoveReport};
