use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// External binary storage addressed by URL.
pub trait BlobStore {
    /// Store `bytes` under `key` and return the URL that now addresses them.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String>;
    fn get(&self, url: &str) -> Result<Vec<u8>>;
    fn delete(&self, url: &str) -> Result<()>;
}

/// Blob store backed by a local directory, handing out `file://` URLs.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    /// Map a URL back to a file under the root, refusing anything outside it.
    fn resolve(&self, url: &str) -> Result<PathBuf> {
        let path = Url::parse(url)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| Error::Blob(format!("not a file URL: {}", url)))?;
        if !path.starts_with(&self.root) || has_parent_refs(&path) {
            return Err(Error::Blob(format!("outside blob root: {}", url)));
        }
        Ok(path)
    }
}

fn has_parent_refs(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let relative = Path::new(key);
        if relative.is_absolute() || has_parent_refs(relative) {
            return Err(Error::Blob(format!("invalid blob key: {}", key)));
        }
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Blob(e.to_string()))?;
        }
        fs::write(&path, bytes).map_err(|e| Error::Blob(e.to_string()))?;

        let url = Url::from_file_path(&path)
            .map_err(|_| Error::Blob(format!("cannot address {}", path.display())))?;
        debug!(key, content_type, size = bytes.len(), "stored blob");
        Ok(url.to_string())
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.resolve(url)?;
        fs::read(&path).map_err(|e| Error::Blob(e.to_string()))
    }

    fn delete(&self, url: &str) -> Result<()> {
        let path = self.resolve(url)?;
        fs::remove_file(&path).map_err(|e| Error::Blob(e.to_string()))?;
        debug!(path = %path.display(), "deleted blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        let url = store
            .put("resumes/alice/cv.pdf", b"%PDF-1.7", "application/pdf")
            .unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(store.get(&url).unwrap(), b"%PDF-1.7");

        store.delete(&url).unwrap();
        assert!(matches!(store.get(&url), Err(Error::Blob(_))));
        assert!(store.delete(&url).is_err());
    }

    #[test]
    fn keys_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(&dir.path().join("blobs")).unwrap();

        assert!(store.put("../escape.txt", b"x", "text/plain").is_err());
        assert!(store.put("/etc/passwd", b"x", "text/plain").is_err());

        let outside = Url::from_file_path(dir.path().join("other.txt")).unwrap();
        assert!(store.get(outside.as_str()).is_err());
        assert!(store.get("https://example.com/cv.pdf").is_err());
    }
}
