use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::RelayError;

/// Audio bytes plus the metadata the transcription endpoint needs.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// An uploaded blob written to a unique path for the lifetime of one
/// request. The file is removed when the guard is dropped, on every exit
/// path; removal failures are logged, never returned.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
    file_name: String,
    mime_type: String,
}

impl TransientFile {
    pub async fn write(
        dir: &Path,
        upload_name: Option<&str>,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Self, RelayError> {
        tokio::fs::create_dir_all(dir).await?;
        let ext = upload_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| extension_for_mime(mime_type).to_string());
        let file_name = format!("{}.{ext}", uuid::Uuid::new_v4());
        let path = dir.join(&file_name);

        let guard = TransientFile {
            path,
            file_name,
            mime_type: mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or("application/octet-stream")
                .to_string(),
        };
        // Guard exists before the write so a partial file is cleaned up too.
        tokio::fs::write(&guard.path, bytes).await?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_clip(&self) -> Result<AudioClip, RelayError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(AudioClip {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            bytes,
        })
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                "Failed to remove transient upload: {e}"
            ),
        }
    }
}

fn extension_for_mime(mime_type: Option<&str>) -> &'static str {
    let mime = mime_type.unwrap_or_default().to_ascii_lowercase();
    let base = mime.split(';').next().unwrap_or_default().trim();
    match base {
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir() -> PathBuf {
        std::env::temp_dir().join(format!("voicerelay_upload_test_{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_write_read_and_cleanup_on_drop() {
        let dir = test_dir();
        let file = TransientFile::write(&dir, Some("clip.webm"), Some("audio/webm"), b"RIFF")
            .await
            .unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "webm");

        let clip = file.read_clip().await.unwrap();
        assert_eq!(clip.bytes, b"RIFF");
        assert_eq!(clip.mime_type, "audio/webm");
        assert!(clip.file_name.ends_with(".webm"));

        drop(file);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_get_distinct_paths() {
        let dir = test_dir();
        let a = TransientFile::write(&dir, None, None, b"a").await.unwrap();
        let b = TransientFile::write(&dir, None, None, b"b").await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.read_clip().await.unwrap().bytes, b"a");
        assert_eq!(b.read_clip().await.unwrap().bytes, b"b");
        drop((a, b));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_drop_after_external_removal_is_silent() {
        let dir = test_dir();
        let file = TransientFile::write(&dir, None, Some("audio/ogg"), b"x")
            .await
            .unwrap();
        std::fs::remove_file(file.path()).unwrap();
        assert!(file.read_clip().await.is_err());
        drop(file);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime(Some("audio/webm;codecs=opus")), "webm");
        assert_eq!(extension_for_mime(Some("audio/x-wav")), "wav");
        assert_eq!(extension_for_mime(None), "mp3");
    }

    #[tokio::test]
    async fn test_unsafe_extension_is_ignored() {
        let dir = test_dir();
        let file = TransientFile::write(&dir, Some("../../etc/x.w/v"), Some("audio/ogg"), b"x")
            .await
            .unwrap();
        assert_eq!(file.path().parent().unwrap(), dir.as_path());
        assert_eq!(file.path().extension().unwrap(), "ogg");
        drop(file);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
