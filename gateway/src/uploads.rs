use std::path::PathBuf;

use common_http_errors::ApiError;
use tokio::fs;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "pdf", "doc", "docx", "xls", "xlsx", "txt", "csv"];

/// Tenant-scoped spool directory manager for multipart uploads (spec §4.6,
/// §9's redesign flag on upload-directory layout). One file per upload,
/// removed by the caller once the request completes.
#[derive(Clone)]
pub struct UploadSpool {
    root: PathBuf,
    max_bytes: u64,
}

pub struct SpooledFile {
    pub path: PathBuf,
}

impl UploadSpool {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self { root: root.into(), max_bytes }
    }

    fn extension_of(filename: &str) -> Option<String> {
        filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// Validates extension and size, then writes `bytes` under
    /// `<root>/<tenant_id>/<uuid><ext>`.
    pub async fn spool(&self, tenant_id: Uuid, filename: &str, bytes: &[u8]) -> Result<SpooledFile, ApiError> {
        if bytes.len() as u64 > self.max_bytes {
            return Err(ApiError::payload_too_large("uploaded file exceeds the size limit"));
        }

        let ext = Self::extension_of(filename).filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()));
        let ext = ext.ok_or_else(|| ApiError::bad_request("ERR_UNSUPPORTED_FILE_TYPE", "unsupported file extension"))?;

        let dir = self.root.join(tenant_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| ApiError::internal(format!("failed to create upload directory: {err}")))?;

        let path = dir.join(format!("{}.{}", Uuid::new_v4(), ext));
        fs::write(&path, bytes)
            .await
            .map_err(|err| ApiError::internal(format!("failed to spool upload: {err}")))?;

        Ok(SpooledFile { path })
    }

    pub async fn cleanup(&self, file: &SpooledFile) {
        let _ = fs::remove_file(&file.path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spools_allowed_extension_under_tenant_dir() {
        let tmp = std::env::temp_dir().join(format!("gw-upload-test-{}", Uuid::new_v4()));
        let spool = UploadSpool::new(&tmp, 1024);
        let tenant = Uuid::new_v4();
        let file = spool.spool(tenant, "receipt.pdf", b"data").await.unwrap();
        assert!(file.path.starts_with(tmp.join(tenant.to_string())));
        spool.cleanup(&file).await;
        let _ = fs::remove_dir_all(&tmp).await;
    }

    #[tokio::test]
    async fn rejects_disallowed_extension() {
        let tmp = std::env::temp_dir().join(format!("gw-upload-test-{}", Uuid::new_v4()));
        let spool = UploadSpool::new(&tmp, 1024);
        let err = spool.spool(Uuid::new_v4(), "script.exe", b"data").await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_oversize_upload() {
        let tmp = std::env::temp_dir().join(format!("gw-upload-test-{}", Uuid::new_v4()));
        let spool = UploadSpool::new(&tmp, 2);
        let err = spool.spool(Uuid::new_v4(), "receipt.pdf", b"too much data").await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);
    }
}
