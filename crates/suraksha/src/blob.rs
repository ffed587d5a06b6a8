//! Content-addressed storage for media payloads.
//!
//! The alert core only ever sees [`PayloadHandle`]s. Handles produced by
//! [`FsBlobStore`] have the form `blake3:<hex digest>`, so storing the same
//! bytes twice yields the same handle and one file.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::evidence::PayloadHandle;

const HANDLE_PREFIX: &str = "blake3:";

/// Storage for opaque binary payloads.
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Store `bytes` and return a handle to them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dependency`] if the payload cannot be written.
    fn put(&self, bytes: &[u8]) -> Result<PayloadHandle>;

    /// Read back the payload behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a handle this store did not issue and
    /// [`Error::Dependency`] if the payload cannot be read.
    fn get(&self, handle: &PayloadHandle) -> Result<Vec<u8>>;
}

/// Compute the handle for a payload without storing it.
#[must_use]
pub fn content_handle(bytes: &[u8]) -> String {
    format!("{HANDLE_PREFIX}{}", blake3::hash(bytes).to_hex())
}

/// Blob store backed by a directory tree.
///
/// Payloads live at `<root>/<first two hex chars>/<full hex digest>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] if the root cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| Error::DirectoryCreate {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hex: &str) -> PathBuf {
        self.root.join(&hex[..2]).join(hex)
    }

    fn digest_of(handle: &PayloadHandle) -> Result<&str> {
        handle
            .as_str()
            .strip_prefix(HANDLE_PREFIX)
            .filter(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| Error::validation(format!("not a blob handle: {handle}")))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8]) -> Result<PayloadHandle> {
        let handle = content_handle(bytes);
        let hex = &handle[HANDLE_PREFIX.len()..];
        let path = self.path_for(hex);

        if path.exists() {
            debug!(handle = %handle, "Blob already stored");
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::dependency("blob store", e.to_string()))?;
            }
            // A digest path only ever holds complete content
            let partial = path.with_extension(format!("{}.partial", Uuid::new_v4().simple()));
            let written = std::fs::write(&partial, bytes)
                .and_then(|()| std::fs::rename(&partial, &path));
            if let Err(e) = written {
                let _ = std::fs::remove_file(&partial);
                // A concurrent writer of the same content got there first
                if !path.exists() {
                    return Err(Error::dependency("blob store", e.to_string()));
                }
            }
            debug!(handle = %handle, bytes = bytes.len(), "Stored blob");
        }

        PayloadHandle::new(handle)
    }

    fn get(&self, handle: &PayloadHandle) -> Result<Vec<u8>> {
        let hex = Self::digest_of(handle)?;
        std::fs::read(self.path_for(hex))
            .map_err(|e| Error::dependency("blob store", format!("{handle}: {e}")))
    }
}
