// src/services/storage.rs
//! Object storage behind a three-operation interface.
//!
//! The rest of the backend only ever uploads a blob under a key, deletes it,
//! or asks for a time-limited download link; whether the bytes live in S3 or
//! on local disk is decided once at startup.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3Error(String),

    #[error("Local storage I/O failed: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a blob under `key`, returning a retrievable locator
    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Remove the blob stored under `key`
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Time-limited download link for the blob under `key`
    async fn presigned_download_url(
        &self,
        key: &str,
        expires_in_secs: u64,
    ) -> Result<String, StorageError>;
}

pub type DynStorage = Arc<dyn Storage>;

/// Pick the storage backend from the environment.
///
/// Local disk when USE_LOCAL_STORAGE=true or no bucket is configured,
/// otherwise S3 with credentials from the standard AWS env vars.
pub async fn from_env(uploads_dir: PathBuf) -> DynStorage {
    let bucket = env::var("AWS_S3_BUCKET").unwrap_or_default();
    let use_local = env::var("USE_LOCAL_STORAGE")
        .map(|v| v == "true")
        .unwrap_or(false)
        || bucket.is_empty();

    if use_local {
        info!(dir = %uploads_dir.display(), "Using local disk storage");
        return Arc::new(LocalStorage { uploads_dir });
    }

    let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let access_key_id = env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
    let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();

    let credentials = Credentials::new(&access_key_id, &secret_access_key, None, None, "env");

    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region))
        .credentials_provider(credentials)
        .load()
        .await;

    info!(bucket = %bucket, "Using S3 storage");
    Arc::new(S3Storage {
        client: S3Client::new(&aws_config),
        bucket,
    })
}

// ============================================================================
// S3 backend
// ============================================================================

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let body = ByteStream::from(Bytes::from(data));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to upload file to S3");
                StorageError::S3Error(format!("Upload failed: {}", e))
            })?;

        info!(key = %key, bucket = %self.bucket, "File uploaded to S3");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to delete S3 object");
                StorageError::S3Error(format!("Delete failed: {}", e))
            })?;

        info!(key = %key, "File deleted from S3");
        Ok(())
    }

    async fn presigned_download_url(
        &self,
        key: &str,
        expires_in_secs: u64,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(expires_in_secs))
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to presign S3 download");
                StorageError::S3Error(format!("Presign failed: {}", e))
            })?;

        Ok(request.uri().to_string())
    }
}

// ============================================================================
// Local disk backend
// ============================================================================

pub struct LocalStorage {
    uploads_dir: PathBuf,
}

impl LocalStorage {
    // Keys carry path separators ("resumes/U_1/R_2.pdf"); flatten to one file
    fn flat_path(&self, key: &str) -> PathBuf {
        self.uploads_dir.join(key.replace('/', "_"))
    }

    fn public_path(key: &str) -> String {
        format!("/uploads/{}", key.replace('/', "_"))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::write(self.flat_path(key), data).await?;
        Ok(Self::public_path(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.flat_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn presigned_download_url(
        &self,
        key: &str,
        _expires_in_secs: u64,
    ) -> Result<String, StorageError> {
        Ok(Self::public_path(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let dir = std::env::temp_dir().join(format!(
            "resume-analyzer-storage-test-{}",
            crate::common::generate_raw_id(8)
        ));
        let storage = LocalStorage {
            uploads_dir: dir.clone(),
        };

        let locator = storage
            .upload(b"pdf bytes".to_vec(), "resumes/U_1/R_2.pdf", "application/pdf")
            .await
            .unwrap();
        assert_eq!(locator, "/uploads/resumes_U_1_R_2.pdf");

        let on_disk = tokio::fs::read(dir.join("resumes_U_1_R_2.pdf")).await.unwrap();
        assert_eq!(on_disk, b"pdf bytes");

        let url = storage
            .presigned_download_url("resumes/U_1/R_2.pdf", 3600)
            .await
            .unwrap();
        assert_eq!(url, "/uploads/resumes_U_1_R_2.pdf");

        storage.delete("resumes/U_1/R_2.pdf").await.unwrap();
        assert!(!dir.join("resumes_U_1_R_2.pdf").exists());

        // Deleting a missing key is a no-op, not an error
        storage.delete("resumes/U_1/R_2.pdf").await.unwrap();

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
