use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found")]
    NotFound,

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque binary storage for uploaded images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the new blob key.
    async fn put(&self, data: Bytes, content_type: Option<&str>) -> Result<String, BlobError>;

    async fn get(&self, key: &str) -> Result<Bytes, BlobError>;

    /// Delete blobs. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), BlobError>;

    /// Public URL from which the blob can be fetched.
    fn serving_url(&self, key: &str) -> String;

    /// Revoke a serving URL. Stores that serve directly from the key have nothing to do.
    async fn delete_serving_url(&self, _key: &str) -> Result<(), BlobError> {
        Ok(())
    }

    /// Remove every blob.
    async fn clear(&self) -> Result<(), BlobError>;
}

pub type DynBlobStore = Arc<dyn BlobStore>;

/// Blob store backed by a flat directory of files.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Blob store at {:?}", root);
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

/// Keys are generated by `put`; anything that could escape the root is rejected.
fn validate_key(key: &str) -> Result<(), BlobError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(key.to_string()))
    }
}

fn extension_for(content_type: Option<&str>) -> Option<&'static str> {
    let content_type = content_type?;
    mime_guess::get_mime_extensions_str(content_type)?
        .first()
        .copied()
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, data: Bytes, content_type: Option<&str>) -> Result<String, BlobError> {
        let id = uuid::Uuid::now_v7().simple().to_string();
        let key = match extension_for(content_type) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id,
        };
        tokio::fs::write(self.root.join(&key), &data).await?;
        info!("Stored blob {} ({} bytes)", key, data.len());
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<(), BlobError> {
        for key in keys {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn serving_url(&self, key: &str) -> String {
        format!("/images/{}", key)
    }

    async fn clear(&self) -> Result<(), BlobError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}
