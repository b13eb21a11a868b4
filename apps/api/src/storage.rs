//! Local-disk file store for uploaded documents. Files are written under
//! `<root>/<owner>/<category>/` with a generated name, so the caller-supplied
//! filename is never used as a path component.

use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "md"];
pub const MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Outcome of storing an upload: where it landed, the normalized type, and
/// the byte count, as persisted alongside the owning row.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: String,
    pub file_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    /// Validates and writes an upload, returning the stored path and
    /// normalized type. Rejects disallowed extensions and oversize payloads
    /// with a validation error.
    pub async fn store(
        &self,
        owner: Uuid,
        category: &str,
        bytes: &[u8],
        file_name_hint: &str,
    ) -> Result<StoredFile, AppError> {
        if bytes.is_empty() {
            return Err(AppError::Validation("File is required".to_string()));
        }

        let extension = extension_of(file_name_hint).ok_or_else(|| {
            AppError::Validation("Only PDF, DOCX, and MD files are allowed".to_string())
        })?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::Validation(
                "Only PDF, DOCX, and MD files are allowed".to_string(),
            ));
        }

        if bytes.len() > MAX_FILE_SIZE_BYTES {
            return Err(AppError::Validation(
                "File size cannot exceed 10MB".to_string(),
            ));
        }

        let dir = self.root.join(owner.to_string()).join(category);
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{extension}", Uuid::new_v4());
        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;

        Ok(StoredFile {
            path: path.to_string_lossy().into_owned(),
            file_type: extension.to_uppercase(),
            size_bytes: bytes.len() as i64,
        })
    }

    /// Reads a stored file back. A database row pointing at a missing file is
    /// a data-integrity problem; it surfaces as not-found, not a crash.
    pub async fn retrieve(&self, path: &str) -> Result<Vec<u8>, AppError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file missing on disk: {path}");
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Best-effort delete; a file already gone is not an error.
    pub async fn remove(&self, path: &str) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to delete stored file {path}: {e}");
            }
        }
    }
}

/// Lowercased extension of a filename, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// MIME type for a stored file's recorded type.
pub fn content_type(file_type: &str) -> &'static str {
    match file_type.to_lowercase().as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let (_dir, store) = store();
        let owner = Uuid::new_v4();
        let stored = store
            .store(owner, "resumes", b"%PDF-1.7", "my resume.pdf")
            .await
            .unwrap();
        assert_eq!(stored.file_type, "PDF");
        assert_eq!(stored.size_bytes, 8);
        assert_eq!(store.retrieve(&stored.path).await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_stored_name_ignores_hint() {
        let (_dir, store) = store();
        let stored = store
            .store(Uuid::new_v4(), "resumes", b"data", "../../etc/passwd.md")
            .await
            .unwrap();
        assert!(!stored.path.contains("passwd"));
        assert!(stored.path.ends_with(".md"));
    }

    #[tokio::test]
    async fn test_rejects_disallowed_extension() {
        let (_dir, store) = store();
        let err = store
            .store(Uuid::new_v4(), "resumes", b"data", "script.exe")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rejects_missing_extension() {
        let (_dir, store) = store();
        let err = store
            .store(Uuid::new_v4(), "resumes", b"data", "noextension")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversize() {
        let (_dir, store) = store();
        let bytes = vec![0u8; MAX_FILE_SIZE_BYTES + 1];
        let err = store
            .store(Uuid::new_v4(), "resumes", &bytes, "big.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rejects_empty_file() {
        let (_dir, store) = store();
        let err = store
            .store(Uuid::new_v4(), "resumes", b"", "empty.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.retrieve("/nonexistent/file.pdf").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let (_dir, store) = store();
        store.remove("/nonexistent/file.pdf").await;
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(content_type("PDF"), "application/pdf");
        assert_eq!(content_type("md"), "text/markdown");
        assert_eq!(content_type("xyz"), "application/octet-stream");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("archive.tar.md").as_deref(), Some("md"));
        assert_eq!(extension_of("none"), None);
    }
}
