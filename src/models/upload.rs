//! Client-side upload attempt types: the selected file, the chosen transfer
//! path and the externally visible attempt status.

use bytes::Bytes;
use serde::Serialize;
use std::{fmt, io, path::Path};

/// The file picked by the user. Bytes are opaque and never parsed.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl SourceFile {
    /// Build from in-memory bytes; the content type is guessed from `name`.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();
        Self {
            name,
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Read a local file fully into memory.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Which of the two transfer strategies handled (or failed) a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPath {
    Direct,
    Proxied,
}

impl fmt::Display for TransferPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPath::Direct => f.write_str("direct"),
            TransferPath::Proxied => f.write_str("proxied"),
        }
    }
}

/// Externally visible status of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStatus {
    Idle,
    TokenRequested,
    TokenReady,
    TokenFailed,
    Transferring,
    TransferSucceeded,
    TransferFailed,
    ListingRefreshed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UploadStatus::Idle => "idle",
            UploadStatus::TokenRequested => "token requested",
            UploadStatus::TokenReady => "token ready",
            UploadStatus::TokenFailed => "token failed",
            UploadStatus::Transferring => "transferring",
            UploadStatus::TransferSucceeded => "transfer succeeded",
            UploadStatus::TransferFailed => "transfer failed",
            UploadStatus::ListingRefreshed => "listing refreshed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_is_guessed_from_name() {
        assert_eq!(SourceFile::new("photo.jpg", vec![1u8]).content_type, "image/jpeg");
        assert_eq!(
            SourceFile::new("blob", vec![1u8]).content_type,
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn from_path_keeps_file_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let file = SourceFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.len(), 5);
        assert_eq!(file.content_type, "text/plain");
    }
}
