use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use pubstore_types::Md5Digest;
use serde::{Deserialize, Serialize};

/// Metadata of a stored object, as reported by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Absolute object key.
    pub name: String,
    pub bucket: String,
    /// Version number; bumped on every write. Live objects never have 0.
    pub generation: u64,
    pub size: u64,
    /// Base64 MD5 of the content. `None` for composite objects.
    pub md5_hash: Option<String>,
    pub content_type: Option<String>,
    /// Custom key/value metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub updated: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// The reported MD5 in canonical form, if the store reported a usable one.
    pub fn md5_digest(&self) -> Option<Md5Digest> {
        self.md5_hash
            .as_deref()
            .and_then(|h| Md5Digest::from_base64(h).ok())
    }
}

/// One page of a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Absolute keys on this page, in lexicographic order.
    pub names: Vec<String>,
    /// Opaque cursor for the next page; empty when the listing is exhausted.
    pub next_page_token: String,
}

impl ListPage {
    /// Returns `true` if no further pages follow.
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_empty()
    }
}

/// Generation precondition attached to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// Succeed only if the live generation equals the value (0 = no live object).
    IfGenerationMatch(u64),
    /// Succeed only if the live generation differs from the value.
    IfGenerationNotMatch(u64),
}

impl Precondition {
    /// Evaluate against the current generation (`None` = no live object).
    pub fn holds(&self, current: Option<u64>) -> bool {
        let current = current.unwrap_or(0);
        match *self {
            Precondition::IfGenerationMatch(g) => current == g,
            Precondition::IfGenerationNotMatch(g) => current != g,
        }
    }
}

/// Content to upload: a reader plus an optional length hint.
///
/// The reader is owned by the body and dropped when the upload finishes,
/// whether it succeeded or not.
pub struct UploadBody {
    reader: Box<dyn Read + Send>,
    len: Option<u64>,
}

impl UploadBody {
    /// Wrap any reader; the length is unknown.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self { reader, len: None }
    }

    /// Wrap a reader whose total length is known.
    pub fn sized(reader: Box<dyn Read + Send>, len: u64) -> Self {
        Self {
            reader,
            len: Some(len),
        }
    }

    /// Upload an in-memory buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self::sized(Box::new(Cursor::new(data)), len)
    }

    /// Open a local file for upload.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self::sized(Box::new(file), len))
    }

    /// Length hint, if known.
    pub fn len_hint(&self) -> Option<u64> {
        self.len
    }

    /// Read the whole body into memory.
    pub fn read_to_vec(mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Split into the reader and the length hint.
    pub fn into_parts(self) -> (Box<dyn Read + Send>, Option<u64>) {
        (self.reader, self.len)
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBody").field("len", &self.len).finish()
    }
}
