use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;

use crate::error::{StoreError, StoreResult};
use crate::object::{ListPage, ObjectMeta, Precondition, UploadBody};
use crate::traits::BlobStore;

/// Upper bound on a single listing page, matching Cloud Storage.
const MAX_PAGE_SIZE: usize = 1000;

/// A primitive store operation, used for call counting and fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Insert,
    Delete,
    List,
    Rewrite,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Get => "get",
            StoreOp::Insert => "insert",
            StoreOp::Delete => "delete",
            StoreOp::List => "list",
            StoreOp::Rewrite => "rewrite",
        };
        f.write_str(name)
    }
}

struct StoredBlob {
    data: Vec<u8>,
    meta: ObjectMeta,
}

struct Fault {
    op: StoreOp,
    key: String,
    skip: usize,
}

/// In-memory, `BTreeMap`-based blob store.
///
/// Intended for tests and embedding. Behaves like the real store where it
/// matters: generations increase on every write, MD5 is computed on upload
/// and reported in base64, listing is ordered and paginated. On top of that
/// it counts calls per operation and can be told to fail specific calls.
pub struct InMemoryBlobStore {
    objects: RwLock<BTreeMap<(String, String), StoredBlob>>,
    next_generation: AtomicU64,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl InMemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            next_generation: AtomicU64::new(1),
            faults: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Number of objects across all buckets.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if `bucket/key` holds an object.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .expect("lock poisoned")
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Content of an object, if present.
    pub fn read_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .map(|blob| blob.data.clone())
    }

    /// Metadata of an object, if present. Not counted as a call.
    pub fn meta(&self, bucket: &str, key: &str) -> Option<ObjectMeta> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(&(bucket.to_string(), key.to_string()))
            .map(|blob| blob.meta.clone())
    }

    /// Sorted keys of every object in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Seed an object directly. Not counted as a call, never faulted.
    pub fn put_bytes(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectMeta {
        let md5 = BASE64.encode(md5::compute(data).0);
        self.store(bucket, key, data.to_vec(), Some(md5), None, BTreeMap::new())
    }

    /// Seed a composite object: it has content but no MD5.
    pub fn insert_composite(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectMeta {
        self.store(bucket, key, data.to_vec(), None, None, BTreeMap::new())
    }

    /// Make the next call of `op` on `key` fail.
    ///
    /// For `StoreOp::List` the key is the listing prefix; for
    /// `StoreOp::Rewrite` it is the source key.
    pub fn fail_next(&self, op: StoreOp, key: impl Into<String>) {
        self.fail_after(op, key, 0);
    }

    /// Let `skip` matching calls through, then fail the next one.
    pub fn fail_after(&self, op: StoreOp, key: impl Into<String>, skip: usize) {
        self.faults.lock().expect("lock poisoned").push(Fault {
            op,
            key: key.into(),
            skip,
        });
    }

    /// Number of trait calls made for `op` so far.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .expect("lock poisoned")
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Reset all call counters.
    pub fn reset_calls(&self) {
        self.calls.lock().expect("lock poisoned").clear();
    }

    /// Remove all objects, faults, and counters.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
        self.faults.lock().expect("lock poisoned").clear();
        self.reset_calls();
    }

    fn enter(&self, op: StoreOp, key: &str) -> StoreResult<()> {
        *self
            .calls
            .lock()
            .expect("lock poisoned")
            .entry(op)
            .or_insert(0) += 1;

        let mut faults = self.faults.lock().expect("lock poisoned");
        if let Some(pos) = faults.iter().position(|f| f.op == op && f.key == key) {
            if faults[pos].skip == 0 {
                faults.remove(pos);
                return Err(StoreError::Injected {
                    op: op.to_string(),
                    key: key.to_string(),
                });
            }
            faults[pos].skip -= 1;
        }
        Ok(())
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        md5_hash: Option<String>,
        content_type: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> ObjectMeta {
        let meta = ObjectMeta {
            name: key.to_string(),
            bucket: bucket.to_string(),
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
            size: data.len() as u64,
            md5_hash,
            content_type,
            metadata,
            updated: Some(Utc::now()),
        };
        self.objects.write().expect("lock poisoned").insert(
            (bucket.to_string(), key.to_string()),
            StoredBlob {
                data,
                meta: meta.clone(),
            },
        );
        meta
    }

    fn not_found(bucket: &str, key: &str) -> StoreError {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(
        &self,
        bucket: &str,
        key: &str,
        precondition: Option<Precondition>,
    ) -> StoreResult<ObjectMeta> {
        self.enter(StoreOp::Get, key)?;
        let meta = self
            .meta(bucket, key)
            .ok_or_else(|| Self::not_found(bucket, key))?;
        if let Some(pre) = precondition {
            if !pre.holds(Some(meta.generation)) {
                return Err(StoreError::PreconditionFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(meta)
    }

    fn insert(&self, bucket: &str, key: &str, body: UploadBody) -> StoreResult<ObjectMeta> {
        self.enter(StoreOp::Insert, key)?;
        let data = body.read_to_vec()?;
        let md5 = BASE64.encode(md5::compute(&data).0);
        Ok(self.store(bucket, key, data, Some(md5), None, BTreeMap::new()))
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.enter(StoreOp::Delete, key)?;
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: usize,
        page_token: &str,
    ) -> StoreResult<ListPage> {
        self.enter(StoreOp::List, prefix)?;
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        // The token is the last key of the previous page.
        let start = if page_token.is_empty() {
            Bound::Included((bucket.to_string(), prefix.to_string()))
        } else {
            Bound::Excluded((bucket.to_string(), page_token.to_string()))
        };

        let map = self.objects.read().expect("lock poisoned");
        let mut matching = map
            .range((start, Bound::Unbounded))
            .map(|((b, k), _)| (b, k))
            .take_while(|(b, k)| *b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone());

        let names: Vec<String> = matching.by_ref().take(page_size).collect();
        let next_page_token = match (matching.next(), names.last()) {
            (Some(_), Some(last)) => last.clone(),
            _ => String::new(),
        };
        Ok(ListPage {
            names,
            next_page_token,
        })
    }

    fn rewrite(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        basis: &ObjectMeta,
    ) -> StoreResult<ObjectMeta> {
        self.enter(StoreOp::Rewrite, src_key)?;
        let (data, md5_hash) = {
            let map = self.objects.read().expect("lock poisoned");
            let src = map
                .get(&(src_bucket.to_string(), src_key.to_string()))
                .ok_or_else(|| Self::not_found(src_bucket, src_key))?;
            (src.data.clone(), src.meta.md5_hash.clone())
        };
        Ok(self.store(
            dst_bucket,
            dst_key,
            data,
            md5_hash,
            basis.content_type.clone(),
            basis.metadata.clone(),
        ))
    }
}

impl fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryBlobStore")
            .field("object_count", &count)
            .finish()
    }
}
