use chrono::Utc;
use uuid::Uuid;

use crate::errors::{AppError, ErrorCode};
use crate::store::PhotoStore;
use crate::validation;

/// A photo picked by the user, not yet uploaded.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Result of uploading a batch: URLs of stored photos plus the files that
/// were skipped, each with the reason.
#[derive(Debug, Default)]
pub struct UploadBatch {
    pub urls: Vec<String>,
    pub rejected: Vec<(String, AppError)>,
}

/// Object key for a new photo: upload time plus a unique suffix, keeping
/// the original extension.
pub fn photo_key(file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_else(|| "bin".into());
    format!("{}-{}.{}", Utc::now().timestamp_millis(), Uuid::now_v7().simple(), ext)
}

/// Upload up to `room` photos. Invalid files are skipped and reported; a
/// batch larger than `room` is refused outright.
pub async fn upload_photos<P: PhotoStore>(photos: &P, files: Vec<PhotoUpload>, room: usize) -> Result<UploadBatch, AppError> {
    validation::check_photo_count(files.len(), room)?;

    let mut batch = UploadBatch::default();
    for file in files {
        let content_type = match validation::check_photo(&file.file_name, file.bytes.len()) {
            Ok(ct) => ct,
            Err(e) => {
                tracing::warn!(file = %file.file_name, error = %e, "photo rejected");
                batch.rejected.push((file.file_name, e));
                continue;
            }
        };

        let key = photo_key(&file.file_name);
        match photos.put(&key, file.bytes, content_type).await {
            Ok(url) => {
                tracing::info!(key = %key, url = %url, "photo uploaded");
                batch.urls.push(url);
            }
            Err(e) => {
                tracing::error!(file = %file.file_name, error = %e, "photo upload failed");
                batch.rejected.push((
                    file.file_name,
                    AppError::new(ErrorCode::PhotoUploadFailed, e.to_string()),
                ));
            }
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::MemoryStore;

    #[test]
    fn keys_keep_extension_and_are_unique() {
        let a = photo_key("Lamp.JPG");
        let b = photo_key("Lamp.JPG");
        assert!(a.ends_with(".jpg"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn invalid_files_are_skipped() {
        let store = MemoryStore::new();
        let files = vec![
            PhotoUpload::new("desk.png", vec![1, 2, 3]),
            PhotoUpload::new("notes.pdf", vec![1]),
            PhotoUpload::new("huge.jpg", vec![0; validation::MAX_PHOTO_BYTES + 1]),
        ];

        let batch = upload_photos(&store, files, 3).await.unwrap();
        assert_eq!(batch.urls.len(), 1);
        assert_eq!(batch.rejected.len(), 2);
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn oversized_batch_is_refused() {
        let store = MemoryStore::new();
        let files = (0..4).map(|i| PhotoUpload::new(format!("{i}.png"), vec![1])).collect();

        let err = upload_photos(&store, files, 3).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::TooManyPhotos));
        assert_eq!(store.object_count(), 0);
    }
}
