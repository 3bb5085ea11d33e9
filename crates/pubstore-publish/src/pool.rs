//! Package pool: where published package content is read from.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Source of package files, addressed by pool-relative path.
pub trait PackagePool: Send + Sync {
    /// Open the file at `path` for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// A package pool laid out as a directory tree on local disk.
#[derive(Clone, Debug)]
pub struct LocalPackagePool {
    root: PathBuf,
}

impl LocalPackagePool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the pool.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a pool-relative path. Absolute paths and `..` are rejected so
    /// lookups cannot leave the pool.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("pool path escapes pool root: {path}"),
                    ))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

impl PackagePool for LocalPackagePool {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path)?)?;
        Ok(Box::new(file))
    }
}
