use crate::error::StoreResult;
use crate::object::{ListPage, ObjectMeta, Precondition, UploadBody};

/// Flat key/value blob store.
///
/// All implementations must satisfy these invariants:
/// - Keys are opaque strings; there is no hierarchy and no rename.
/// - Writes fully replace the previous object and assign a new generation.
/// - A missing object is reported as `StoreError::NotFound` by `get`,
///   `delete` and `rewrite`, and by nothing else.
/// - `list` returns keys in lexicographic order and terminates the
///   pagination with an empty `next_page_token`.
/// - Implementations are safe for concurrent use (`Send + Sync`).
pub trait BlobStore: Send + Sync {
    /// Short label for the backend, used in descriptions and errors.
    fn name(&self) -> &str {
        "blob"
    }

    /// Fetch object metadata, optionally guarded by a generation precondition.
    ///
    /// Returns `NotFound` if the object does not exist and
    /// `PreconditionFailed` if it exists but the precondition rejects it.
    fn get(
        &self,
        bucket: &str,
        key: &str,
        precondition: Option<Precondition>,
    ) -> StoreResult<ObjectMeta>;

    /// Upload `body` as the object at `key`, replacing any existing object.
    fn insert(&self, bucket: &str, key: &str, body: UploadBody) -> StoreResult<ObjectMeta>;

    /// Delete the object at `key`. Deleting a missing key is `NotFound`.
    fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Fetch one page of keys starting with `prefix`.
    ///
    /// Pass an empty `page_token` for the first page, then the previous
    /// page's `next_page_token` verbatim.
    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: usize,
        page_token: &str,
    ) -> StoreResult<ListPage>;

    /// Server-side copy of `src_key` to `dst_key`, using `basis` (usually the
    /// source's own metadata) for the destination's content type and
    /// custom metadata.
    fn rewrite(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        basis: &ObjectMeta,
    ) -> StoreResult<ObjectMeta>;

    /// Check whether an object exists, propagating anything but absence.
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        match self.get(bucket, key, None) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
