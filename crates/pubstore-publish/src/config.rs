use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::{DEFAULT_PAGE_SIZE, DEFAULT_PROGRESS_BATCH};
use crate::error::{PublishError, PublishResult};

/// Configuration for one published storage target.
///
/// ```toml
/// bucket = "apt-repo"
/// prefix = "debian"
/// page_size = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket holding the published repository.
    pub bucket: String,
    /// Key prefix all published paths live under.
    pub prefix: String,
    /// Entries requested per listing page.
    pub page_size: usize,
    /// Deletions per progress update during recursive removal.
    pub progress_batch: u64,
    /// API endpoint override (emulators, private endpoints).
    pub endpoint: Option<String>,
    /// Fixed bearer token; ambient credentials are used when unset.
    pub access_token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            progress_batch: DEFAULT_PROGRESS_BATCH,
            endpoint: None,
            access_token: None,
        }
    }
}

impl StorageConfig {
    /// Configuration for `bucket` with everything else defaulted.
    pub fn for_bucket(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> PublishResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| PublishError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file without validating it, so that missing
    /// values can still be filled in by the caller.
    pub fn read(path: &Path) -> PublishResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PublishError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| PublishError::Config(format!("{}: {e}", path.display())))
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> PublishResult<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> PublishResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(PublishError::Config("bucket must be set".into()));
        }
        if self.page_size == 0 {
            return Err(PublishError::Config("page_size must be positive".into()));
        }
        if self.progress_batch == 0 {
            return Err(PublishError::Config("progress_batch must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = StorageConfig::default();
        assert_eq!(c.page_size, 1000);
        assert_eq!(c.progress_batch, 100);
        assert!(c.prefix.is_empty());
        assert!(c.endpoint.is_none());
        assert!(c.validate().is_err());
    }

    #[test]
    fn parse_minimal() {
        let c = StorageConfig::from_toml_str(r#"bucket = "apt-repo""#).unwrap();
        assert_eq!(c, StorageConfig::for_bucket("apt-repo", ""));
    }

    #[test]
    fn parse_full() {
        let c = StorageConfig::from_toml_str(
            r#"
            bucket = "apt-repo"
            prefix = "debian"
            page_size = 250
            progress_batch = 10
            endpoint = "http://localhost:4443"
            "#,
        )
        .unwrap();
        assert_eq!(c.prefix, "debian");
        assert_eq!(c.page_size, 250);
        assert_eq!(c.progress_batch, 10);
        assert_eq!(c.endpoint.as_deref(), Some("http://localhost:4443"));
        assert!(c.access_token.is_none());
    }

    #[test]
    fn missing_bucket_is_rejected() {
        let err = StorageConfig::from_toml_str(r#"prefix = "x""#).unwrap_err();
        assert!(matches!(err, PublishError::Config(msg) if msg.contains("bucket")));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = StorageConfig::from_toml_str("bucket = \"b\"\npage_size = 0").unwrap_err();
        assert!(matches!(err, PublishError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(StorageConfig::from_toml_str("bucket = ").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pubstore.toml");
        std::fs::write(&path, "bucket = \"b\"\nprefix = \"p\"\n").unwrap();
        let c = StorageConfig::load(&path).unwrap();
        assert_eq!(c.bucket, "b");
        assert_eq!(c.prefix, "p");

        assert!(StorageConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn read_skips_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pubstore.toml");
        std::fs::write(&path, "prefix = \"p\"\n").unwrap();

        let c = StorageConfig::read(&path).unwrap();
        assert!(c.bucket.is_empty());
        assert_eq!(c.prefix, "p");
        assert!(StorageConfig::load(&path).is_err());
    }
}
