//! Output persistence.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use mosaic_media_model::ContainerFormat;

/// Persists finalized bytes. I/O errors are returned unchanged so the
/// caller can surface them verbatim.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> io::Result<PathBuf>;
}

/// `recording_YYYYmmdd_HHMMSS.<ext>`
pub fn suggested_name(container: ContainerFormat, at: DateTime<Local>) -> String {
    format!(
        "recording_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        container.extension()
    )
}

/// Writes recordings into one directory, never overwriting an existing file.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim `name`, or the first free `name_N`, with an exclusive create.
    async fn create_unique(&self, name: &str) -> io::Result<(PathBuf, File)> {
        for n in 0u32.. {
            let path = self.dir.join(numbered(name, n));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"))
    }
}

fn numbered(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("recording");
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{stem}_{n}.{ext}"),
        None => format!("{stem}_{n}"),
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let (path, mut file) = self.create_unique(suggested_name).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), mime_type, "Recording saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn names_follow_timestamp_pattern() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            suggested_name(ContainerFormat::Matroska, at),
            "recording_20240309_140507.mkv"
        );
        assert_eq!(
            suggested_name(ContainerFormat::WebM, at),
            "recording_20240309_140507.webm"
        );
    }

    #[tokio::test]
    async fn saves_into_created_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out"));
        let path = sink.save(b"data", "a.mkv", "video/x-matroska").await.unwrap();
        assert_eq!(path, tmp.path().join("out").join("a.mkv"));
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[tokio::test]
    async fn existing_files_are_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let first = sink.save(b"one", "a.mkv", "video/x-matroska").await.unwrap();
        let second = sink.save(b"two", "a.mkv", "video/x-matroska").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "a_1.mkv");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_claim_distinct_files() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let saves: Vec<_> = (0..8u8)
            .map(|i| {
                let sink = sink.clone();
                tokio::spawn(async move { (i, sink.save(&[i], "a.mkv", "video/x-matroska").await) })
            })
            .collect();

        let mut paths = std::collections::HashSet::new();
        for save in saves {
            let (i, result) = save.await.unwrap();
            let path = result.unwrap();
            assert_eq!(std::fs::read(&path).unwrap(), vec![i]);
            paths.insert(path);
        }
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn numbered_names_keep_the_extension() {
        assert_eq!(numbered("a.mkv", 0), "a.mkv");
        assert_eq!(numbered("a.mkv", 3), "a_3.mkv");
        assert_eq!(numbered("plain", 2), "plain_2");
    }

    #[tokio::test]
    async fn io_errors_pass_through() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let sink = DirectorySink::new(blocker.join("sub"));
        assert!(sink.save(b"data", "a.mkv", "video/x-matroska").await.is_err());
    }
}
