//! Foundation types for pubstore.
//!
//! This crate provides the value types shared by the blob store client and
//! the published-storage backend. Every other pubstore crate depends on
//! `pubstore-types`.
//!
//! # Key Types
//!
//! - [`ChecksumInfo`]: Caller-supplied digests of a source file
//! - [`Md5Digest`]: Canonical MD5 digest, decodable from hex or base64
//! - [`join_key`] / [`dir_prefix`]: Slash-separated object-key construction

pub mod checksum;
pub mod error;
pub mod key;

pub use checksum::{ChecksumInfo, Md5Digest};
pub use error::TypeError;
pub use key::{dir_prefix, join_key, strip_dir_prefix};
