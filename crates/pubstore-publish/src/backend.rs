use std::fmt;
use std::path::Path;

use pubstore_store::{BlobStore, GcsBlobStore, GcsOptions, Precondition, StoreError, UploadBody};
use pubstore_types::{dir_prefix, join_key, strip_dir_prefix, ChecksumInfo};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{PublishError, PublishResult};
use crate::pool::PackagePool;
use crate::progress::{Progress, ProgressBar};
use crate::traits::{FailedRemoval, LinkOutcome, PublishedStorage, RemoveReport};

/// Entries requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Deletions per progress update in `remove_dirs`.
pub const DEFAULT_PROGRESS_BATCH: u64 = 100;

/// [`PublishedStorage`] on top of a flat [`BlobStore`].
///
/// Bound to one bucket and a key prefix; every logical path is joined onto
/// the prefix to form the object key. Holds no state besides that
/// configuration, so it is as safe for concurrent use as the store is.
pub struct BlobPublishedStorage<S> {
    store: S,
    bucket: String,
    prefix: String,
    page_size: usize,
    progress_batch: u64,
}

impl<S: BlobStore> BlobPublishedStorage<S> {
    /// Storage rooted at `prefix` inside `bucket`.
    pub fn new(store: S, bucket: impl Into<String>, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: join_key(&[prefix]),
            page_size: DEFAULT_PAGE_SIZE,
            progress_batch: DEFAULT_PROGRESS_BATCH,
        }
    }

    /// Storage described by `config`, on an already constructed store.
    pub fn from_config(store: S, config: &StorageConfig) -> Self {
        Self::new(store, config.bucket.clone(), &config.prefix)
            .with_page_size(config.page_size)
            .with_progress_batch(config.progress_batch)
    }

    /// Override the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Override how many deletions are reported per progress update.
    pub fn with_progress_batch(mut self, batch: u64) -> Self {
        self.progress_batch = batch.max(1);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Normalized key prefix (no leading or trailing slash).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Absolute object key for a logical path.
    ///
    /// The path is cleaned on its own before joining, so `..` stops at the
    /// storage root and never reaches into the prefix.
    pub fn key(&self, path: &str) -> String {
        join_key(&[&self.prefix, &join_key(&[path])])
    }

    fn remote(&self, op: &'static str, path: &str, source: StoreError) -> PublishError {
        PublishError::Remote {
            op,
            path: path.to_string(),
            storage: self.to_string(),
            source,
        }
    }

    fn upload(&self, key: &str, body: UploadBody, source_path: &str) -> PublishResult<()> {
        let meta = self
            .store
            .insert(&self.bucket, key, body)
            .map_err(|source| PublishError::Upload {
                source_path: source_path.to_string(),
                storage: self.to_string(),
                key: key.to_string(),
                source,
            })?;
        info!(key, generation = meta.generation, size = meta.size, "uploaded");
        Ok(())
    }

    /// All absolute keys starting with `prefix`, following continuation
    /// tokens until the store reports the last page.
    fn list_keys(&self, prefix: &str) -> PublishResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = String::new();
        let mut pages = 0usize;
        loop {
            let page = self
                .store
                .list(&self.bucket, prefix, self.page_size, &token)
                .map_err(|e| self.remote("listing", prefix, e))?;
            pages += 1;
            keys.extend(page.names);
            if page.next_page_token.is_empty() {
                break;
            }
            token = page.next_page_token;
        }
        debug!(prefix, pages, count = keys.len(), "listed keys");
        Ok(keys)
    }
}

impl BlobPublishedStorage<GcsBlobStore> {
    /// Connect to Cloud Storage as described by `config`.
    ///
    /// Fails when no credentials are available; whether that ends the
    /// process is up to the caller.
    pub fn connect(config: &StorageConfig) -> PublishResult<Self> {
        config.validate()?;
        let options = GcsOptions {
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
        };
        let store = GcsBlobStore::connect(&options).map_err(|source| PublishError::Connect {
            storage: format!("GCS: {}:{}", config.bucket, config.prefix),
            source,
        })?;
        Ok(Self::from_config(store, config))
    }
}

impl<S: BlobStore> fmt::Display for BlobPublishedStorage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}:{}", self.store.name(), self.bucket, self.prefix)
    }
}

impl<S: BlobStore> fmt::Debug for BlobPublishedStorage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobPublishedStorage")
            .field("store", &self.store.name())
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl<S: BlobStore> PublishedStorage for BlobPublishedStorage<S> {
    fn mkdir(&self, _path: &str) -> PublishResult<()> {
        // Blob stores have no directories.
        Ok(())
    }

    fn put_file(&self, path: &str, source: &Path) -> PublishResult<()> {
        let source_path = source.display().to_string();
        let body = UploadBody::from_path(source).map_err(|e| PublishError::LocalIo {
            path: source_path.clone(),
            source: e,
        })?;
        self.upload(&self.key(path), body, &source_path)
    }

    fn remove(&self, path: &str) -> PublishResult<()> {
        let key = self.key(path);
        debug!(key = %key, "removing");
        self.store
            .delete(&self.bucket, &key)
            .map_err(|e| self.remote("deleting", path, e))
    }

    fn remove_dirs(&self, path: &str, progress: &mut dyn Progress) -> PublishResult<RemoveReport> {
        let dir = dir_prefix(&self.key(path));
        // Only ever delete inside the requested subtree.
        let (keys, outside): (Vec<String>, Vec<String>) = self
            .list_keys(&dir)?
            .into_iter()
            .partition(|key| strip_dir_prefix(key, &dir).is_some());
        for key in &outside {
            warn!(key = %key, dir = %dir, "listing returned key outside directory; skipped");
        }

        let mut bar = ProgressBar::start(progress, keys.len() as u64, false);
        let mut report = RemoveReport::default();
        let mut pending = 0u64;

        for key in keys {
            match self.store.delete(&self.bucket, &key) {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to delete object; continuing");
                    report.failed.push(FailedRemoval {
                        key,
                        error: e.to_string(),
                    });
                }
            }
            pending += 1;
            if pending == self.progress_batch {
                bar.add(pending);
                pending = 0;
            }
        }
        if pending > 0 {
            bar.add(pending);
        }

        info!(
            dir = %dir,
            deleted = report.deleted,
            failed = report.failed.len(),
            "removed directory"
        );
        Ok(report)
    }

    fn link_from_pool(
        &self,
        published_dir: &str,
        base_name: &str,
        pool: &dyn PackagePool,
        source_path: &str,
        checksums: &ChecksumInfo,
        force: bool,
    ) -> PublishResult<LinkOutcome> {
        let key = self.key(&join_key(&[published_dir, base_name]));

        let outcome = match self.store.get(&self.bucket, &key, None) {
            Ok(existing) => {
                let source_md5 = checksums
                    .md5_digest()
                    .ok_or_else(|| PublishError::MissingSourceChecksum { key: key.clone() })?;
                let remote_md5 = existing
                    .md5_digest()
                    .ok_or_else(|| PublishError::MissingRemoteChecksum { key: key.clone() })?;

                if source_md5 == remote_md5 {
                    debug!(key = %key, md5 = %source_md5, "already published");
                    return Ok(LinkOutcome::AlreadyPresent);
                }
                if !force {
                    return Err(PublishError::DestinationConflict {
                        key,
                        storage: self.to_string(),
                    });
                }
                debug!(key = %key, old = %remote_md5, new = %source_md5, "overwriting");
                LinkOutcome::Replaced
            }
            Err(e) if e.is_not_found() => LinkOutcome::Uploaded,
            Err(e) => return Err(self.remote("checking", &key, e)),
        };

        let reader = pool.open(source_path).map_err(|e| PublishError::LocalIo {
            path: source_path.to_string(),
            source: e,
        })?;
        self.upload(&key, UploadBody::from_reader(reader), source_path)?;
        Ok(outcome)
    }

    fn filelist(&self, prefix: &str) -> PublishResult<Vec<String>> {
        let dir = dir_prefix(&self.key(prefix));
        let keys = self.list_keys(&dir)?;
        Ok(keys
            .iter()
            .filter_map(|k| strip_dir_prefix(k, &dir))
            .map(str::to_string)
            .collect())
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> PublishResult<()> {
        let old_key = self.key(old_name);
        let new_key = self.key(new_name);

        let source = self
            .store
            .get(&self.bucket, &old_key, None)
            .map_err(|e| self.remote("renaming", old_name, e))?;
        if old_key == new_key {
            // Copying onto itself and deleting the source would lose the object.
            debug!(key = %old_key, "rename onto itself; nothing to do");
            return Ok(());
        }
        self.store
            .rewrite(&self.bucket, &old_key, &self.bucket, &new_key, &source)
            .map_err(|e| self.remote("renaming", old_name, e))?;

        // Both keys exist from here until the delete succeeds.
        self.store
            .delete(&self.bucket, &old_key)
            .map_err(|source| PublishError::RenameIncomplete {
                old_key: old_key.clone(),
                new_key: new_key.clone(),
                source,
            })?;
        debug!(from = %old_key, to = %new_key, "renamed");
        Ok(())
    }

    fn symlink(&self, _src: &str, _dst: &str) -> PublishResult<()> {
        Err(PublishError::Unsupported {
            operation: "symbolic links",
            storage: self.to_string(),
        })
    }

    fn hard_link(&self, _src: &str, _dst: &str) -> PublishResult<()> {
        Err(PublishError::Unsupported {
            operation: "hard links",
            storage: self.to_string(),
        })
    }

    fn read_link(&self, _path: &str) -> PublishResult<String> {
        Err(PublishError::Unsupported {
            operation: "symbolic links",
            storage: self.to_string(),
        })
    }

    fn file_exists(&self, path: &str) -> PublishResult<bool> {
        let key = self.key(path);
        // Generation 0 never belongs to a live object, so this only passes
        // when the object exists.
        match self
            .store
            .get(&self.bucket, &key, Some(Precondition::IfGenerationNotMatch(0)))
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() || e.is_precondition_failed() => Ok(false),
            Err(e) => Err(self.remote("checking", path, e)),
        }
    }
}
