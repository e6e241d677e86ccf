//! Flat-file store for base64 image blobs.
//!
//! Each entity family owns one directory; a blob lives at `{dir}/{id}.txt`
//! where `id` is the row id assigned by the database. Writes go to a
//! uniquely named temporary file first and only become visible once the
//! owning transaction has committed and [`StagedImage::publish`] renames
//! the file into place.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            ServiceError::StorageError(format!(
                "Failed to create image directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        info!(path = %dir.display(), "Image store initialized");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, id: i32) -> PathBuf {
        self.dir.join(format!("{}.txt", id))
    }

    /// Path recorded in the entity's `image` column.
    pub fn public_path(&self, id: i32) -> String {
        self.blob_path(id).to_string_lossy().into_owned()
    }

    /// Writes `base64` next to the final location without replacing the current blob.
    pub async fn stage(&self, id: i32, base64: &str) -> Result<StagedImage, ServiceError> {
        let temp = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));
        // Constructed before the write so a partial file is cleaned up on failure.
        let staged = StagedImage {
            temp,
            target: self.blob_path(id),
            published: false,
        };

        let storage_err = |e: std::io::Error| {
            ServiceError::StorageError(format!("Failed to stage image {}: {}", id, e))
        };
        let mut file = fs::File::create(&staged.temp).await.map_err(storage_err)?;
        file.write_all(base64.as_bytes()).await.map_err(storage_err)?;
        // Content must be on disk before the rename can expose it.
        file.sync_all().await.map_err(storage_err)?;

        debug!(id, size = base64.len(), "Staged image");
        Ok(staged)
    }

    /// Reads the blob for `id`; a missing file is `None`, any other failure is an error.
    pub async fn read(&self, id: i32) -> Result<Option<String>, ServiceError> {
        match fs::read_to_string(self.blob_path(id)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ServiceError::StorageError(format!(
                "Failed to read image {}: {}",
                id, e
            ))),
        }
    }

    /// Removes the blob for `id`. Returns `false` when there was nothing to remove.
    pub async fn remove(&self, id: i32) -> Result<bool, ServiceError> {
        match fs::remove_file(self.blob_path(id)).await {
            Ok(()) => {
                debug!(id, "Deleted image");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ServiceError::StorageError(format!(
                "Failed to delete image {}: {}",
                id, e
            ))),
        }
    }
}

/// A blob written to a temporary file that is not yet visible to readers.
///
/// Dropping a staged image without publishing it deletes the temporary file.
#[derive(Debug)]
pub struct StagedImage {
    temp: PathBuf,
    target: PathBuf,
    published: bool,
}

impl StagedImage {
    /// Atomically replaces the live blob with the staged content.
    pub async fn publish(mut self) -> Result<(), ServiceError> {
        fs::rename(&self.temp, &self.target).await.map_err(|e| {
            ServiceError::StorageError(format!(
                "Failed to publish image '{}': {}",
                self.target.display(),
                e
            ))
        })?;
        self.published = true;
        self.sync_parent_dir().await;
        Ok(())
    }

    /// Persists the rename itself. The blob is already live, so failure only warns.
    #[cfg(unix)]
    async fn sync_parent_dir(&self) {
        let Some(dir) = self.target.parent() else {
            return;
        };
        let synced = match fs::File::open(dir).await {
            Ok(handle) => handle.sync_all().await,
            Err(e) => Err(e),
        };
        if let Err(e) = synced {
            warn!(path = %dir.display(), error = %e, "Failed to sync image directory");
        }
    }

    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) {}
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.temp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.temp.display(), error = %e, "Failed to discard staged image");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (ImageStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().join("categories")).await.unwrap();
        (store, dir)
    }

    fn entries(store: &ImageStore) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn published_image_reads_back_verbatim() {
        let (store, _dir) = test_store().await;
        let b64 = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

        store.stage(7, b64).await.unwrap().publish().await.unwrap();

        assert_eq!(store.read(7).await.unwrap().as_deref(), Some(b64));
        assert_eq!(entries(&store), vec!["7.txt".to_string()]);
    }

    #[tokio::test]
    async fn staged_image_is_invisible_until_published() {
        let (store, _dir) = test_store().await;
        store.stage(1, "old").await.unwrap().publish().await.unwrap();

        let staged = store.stage(1, "new").await.unwrap();
        assert_eq!(store.read(1).await.unwrap().as_deref(), Some("old"));

        staged.publish().await.unwrap();
        assert_eq!(store.read(1).await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn staged_file_holds_the_full_blob_before_publish() {
        let (store, _dir) = test_store().await;
        let b64 = "QUJD".repeat(4096);

        let staged = store.stage(9, &b64).await.unwrap();
        let names = entries(&store);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(".9.") && names[0].ends_with(".tmp"));
        let on_disk = std::fs::read_to_string(store.dir().join(&names[0])).unwrap();
        assert_eq!(on_disk, b64);

        staged.publish().await.unwrap();
        assert_eq!(entries(&store), vec!["9.txt".to_string()]);
        assert_eq!(store.read(9).await.unwrap(), Some(b64));
    }

    #[tokio::test]
    async fn dropping_staged_image_discards_it() {
        let (store, _dir) = test_store().await;

        let staged = store.stage(3, "abc").await.unwrap();
        assert_eq!(entries(&store).len(), 1);
        drop(staged);

        assert!(entries(&store).is_empty());
        assert_eq!(store.read(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_image_reads_as_none() {
        let (store, _dir) = test_store().await;
        assert_eq!(store.read(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_reports_whether_a_file_existed() {
        let (store, _dir) = test_store().await;
        store.stage(5, "x").await.unwrap().publish().await.unwrap();

        assert!(store.remove(5).await.unwrap());
        assert!(!store.remove(5).await.unwrap());
        assert_eq!(store.read(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn public_path_points_into_store_dir() {
        let (store, _dir) = test_store().await;
        let path = store.public_path(12);
        assert!(path.ends_with("12.txt"));
        assert!(Path::new(&path).starts_with(store.dir()));
    }
}
