//! Media uploads: extension checks and the object-storage collaborator.
//!
//! Multipart parsing lives in `request`; by the time a file reaches this
//! module it is an in-memory [`UploadedFile`].

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];
pub const AUDIO_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".ogg"];
pub const LYRICS_EXTENSIONS: &[&str] = &[".lrc"];

pub const PROFILE_PHOTO_FOLDER: &str = "user/profilePhoto";
pub const ALBUM_COVER_FOLDER: &str = "album/cover";
pub const SONG_AUDIO_FOLDER: &str = "song/audio";
pub const SONG_LYRICS_FOLDER: &str = "song/lyrics";

/// Errors that can occur during file upload
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Multipart parsing error: {0}")]
    Multipart(multer::Error),
    #[error("File too large (max: {0} bytes)")]
    FileTooLarge(usize),
    #[error("Invalid file type: {0}")]
    InvalidFileType(String),
    #[error("No {0} file in request")]
    MissingFile(&'static str),
    #[error("Object storage did not answer within {0:?}")]
    Timeout(Duration),
}

/// A file part received in a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Field name from the form
    pub field_name: String,
    /// Original filename
    pub filename: String,
    /// MIME type
    pub content_type: String,
    pub data: Bytes,
}

/// Return the lowercased extension of `filename` (with its leading dot) if
/// it is in `allowed`.
pub fn check_file_extension(filename: &str, allowed: &[&str]) -> Result<String, UploadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .ok_or_else(|| UploadError::InvalidFileType(filename.to_string()))?;

    if allowed.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(UploadError::InvalidFileType(filename.to_string()))
    }
}

/// Object storage: `upload(file, name, folder) -> URL`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, data: Bytes, name: &str, folder: &str) -> Result<String, UploadError>;
}

/// Stores objects on the local filesystem below `root` and serves them
/// from `public_base_url`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, data: Bytes, name: &str, folder: &str) -> Result<String, UploadError> {
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).await?;

        let mut file = fs::File::create(dir.join(name)).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(format!(
            "{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            folder,
            name
        ))
    }
}

/// Validates media and pushes it to the object store under a fresh name.
///
/// Every store call is bounded by `timeout` and is not retried.
pub struct MediaUploader {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl MediaUploader {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Upload `file` into `folder` and return its public URL.
    pub async fn store(
        &self,
        file: &UploadedFile,
        allowed: &[&str],
        folder: &str,
    ) -> Result<String, UploadError> {
        let extension = check_file_extension(&file.filename, allowed)?;
        let name = format!("{}{}", Uuid::new_v4(), extension);

        let url = tokio::time::timeout(
            self.timeout,
            self.store.upload(file.data.clone(), &name, folder),
        )
        .await
        .map_err(|_| UploadError::Timeout(self.timeout))??;

        tracing::info!("Stored {} ({} bytes) at {}", file.filename, file.data.len(), url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            field_name: "profile_photo".into(),
            filename: name.into(),
            content_type: "application/octet-stream".into(),
            data: Bytes::from_static(b"\x89PNG...."),
        }
    }

    #[test]
    fn test_check_file_extension() {
        assert_eq!(check_file_extension("me.png", IMAGE_EXTENSIONS).unwrap(), ".png");
        assert_eq!(check_file_extension("ME.JPG", IMAGE_EXTENSIONS).unwrap(), ".jpg");
        assert_eq!(check_file_extension("a.tar.mp3", AUDIO_EXTENSIONS).unwrap(), ".mp3");
        assert!(check_file_extension("song.flac", AUDIO_EXTENSIONS).is_err());
        assert!(check_file_extension("noextension", IMAGE_EXTENSIONS).is_err());
        assert!(check_file_extension("me.png", LYRICS_EXTENSIONS).is_err());
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path(), "http://cdn.test/media/");
        let url = store
            .upload(Bytes::from_static(b"abc"), "x.png", PROFILE_PHOTO_FOLDER)
            .await
            .unwrap();

        assert_eq!(url, "http://cdn.test/media/user/profilePhoto/x.png");
        let written = std::fs::read(dir.path().join("user/profilePhoto/x.png")).unwrap();
        assert_eq!(written, b"abc");
    }

    #[tokio::test]
    async fn test_uploader_renames_and_checks() {
        let dir = TempDir::new().unwrap();
        let uploader = MediaUploader::new(
            Arc::new(LocalObjectStore::new(dir.path(), "http://cdn.test")),
            Duration::from_secs(5),
        );

        let url = uploader
            .store(&file("me.png"), IMAGE_EXTENSIONS, PROFILE_PHOTO_FOLDER)
            .await
            .unwrap();
        assert!(url.starts_with("http://cdn.test/user/profilePhoto/"));
        assert!(url.ends_with(".png"));
        assert!(!url.contains("me.png"));

        let err = uploader
            .store(&file("me.gif"), IMAGE_EXTENSIONS, PROFILE_PHOTO_FOLDER)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidFileType(_)));
    }

    struct StalledStore;

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn upload(&self, _: Bytes, _: &str, _: &str) -> Result<String, UploadError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("never".into())
        }
    }

    #[tokio::test]
    async fn test_uploader_times_out() {
        let uploader = MediaUploader::new(Arc::new(StalledStore), Duration::from_millis(20));
        let err = uploader
            .store(&file("me.png"), IMAGE_EXTENSIONS, PROFILE_PHOTO_FOLDER)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Timeout(_)));
    }
}
