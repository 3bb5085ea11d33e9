//! Flat blob storage for pubstore.
//!
//! A blob store keeps byte payloads under opaque string keys inside a
//! bucket. It has no directories, no rename and no links; those are
//! emulated one layer up, in `pubstore-publish`. This crate only defines
//! the primitive operations the emulation is built from.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`GcsBlobStore`] -- Cloud Storage JSON API over blocking HTTP
//!
//! # Design Rules
//!
//! 1. Keys are absolute; callers do all prefixing.
//! 2. Every write fully replaces the previous object and bumps its generation.
//! 3. Absence is always reported as [`StoreError::NotFound`], never folded
//!    into another error kind.
//! 4. Listing is paginated; the page token is opaque and an empty token
//!    means there are no further pages.
//! 5. Nothing here retries. Transient failures are the caller's business.

pub mod auth;
pub mod error;
pub mod gcs;
pub mod memory;
pub mod object;
pub mod traits;

pub use auth::{MetadataServerToken, NoAuth, StaticToken, TokenProvider};
pub use error::{StoreError, StoreResult};
pub use gcs::{GcsBlobStore, GcsOptions, DEFAULT_ENDPOINT};
pub use memory::{InMemoryBlobStore, StoreOp};
pub use object::{ListPage, ObjectMeta, Precondition, UploadBody};
pub use traits::BlobStore;
