//! Library importer that walks a library directory on disk
//!
//! Layout expected under a library root:
//!
//! ```text
//! <root>/<series>/<chapter>.cbz
//! <root>/<series>/<chapter>/<page>.jpg
//! ```
//!
//! Every directory directly under the root is a series. Inside a series,
//! each archive file and each directory holding at least one image counts
//! as a chapter.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::fs;

use crate::modules::library::domain::{LibraryImporter, LibraryPath, ScanStats};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::logger::TimedOperation;
use crate::{log_debug, log_warn};

const CHAPTER_EXTENSIONS: &[&str] = &["cbz", "cbr", "zip", "pdf", "epub"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif"];

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemLibraryImporter;

impl FilesystemLibraryImporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LibraryImporter for FilesystemLibraryImporter {
    async fn scan_path(&self, library: &LibraryPath) -> AppResult<ScanStats> {
        let timer = TimedOperation::new("library_scan");
        let root = Path::new(&library.path);

        let metadata = fs::metadata(root).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                AppError::NotFound(format!("Library path not found: {}", library.path))
            }
            _ => AppError::from(e),
        })?;

        if !metadata.is_dir() {
            return Err(AppError::InvalidInput(format!(
                "Library path is not a directory: {}",
                library.path
            )));
        }

        let mut stats = ScanStats::default();
        let mut entries = fs::read_dir(root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    log_warn!("Skipping unreadable entry {}: {}", name, e);
                    stats.errors.push(name);
                    continue;
                }
            }

            match count_chapters(&entry.path()).await {
                Ok(chapters) => {
                    log_debug!("Series '{}': {} chapters", name, chapters);
                    stats.series_found += 1;
                    stats.chapters_found += chapters;
                }
                Err(e) => {
                    log_warn!("Failed to read series directory {}: {}", name, e);
                    stats.errors.push(name);
                }
            }
        }

        timer.finish_with_info(&format!(
            "{}: {} series, {} chapters, {} errors",
            library.path,
            stats.series_found,
            stats.chapters_found,
            stats.errors.len()
        ));

        Ok(stats)
    }
}

async fn count_chapters(series_dir: &Path) -> io::Result<usize> {
    let mut chapters = 0;
    let mut entries = fs::read_dir(series_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;

        if file_type.is_file() && has_extension(&path, CHAPTER_EXTENSIONS) {
            chapters += 1;
        } else if file_type.is_dir() && contains_images(&path).await? {
            chapters += 1;
        }
    }

    Ok(chapters)
}

async fn contains_images(dir: &Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() && has_extension(&entry.path(), IMAGE_EXTENSIONS) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    struct TempLibrary {
        root: PathBuf,
    }

    impl TempLibrary {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("mangashelf-scan-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&root).unwrap();
            Self { root }
        }

        fn file(&self, relative: &str) {
            let path = self.root.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"data").unwrap();
        }

        fn library_path(&self) -> LibraryPath {
            LibraryPath {
                id: Uuid::new_v4(),
                path: self.root.to_string_lossy().into_owned(),
                enabled: true,
                scan_interval_hours: 24,
                last_scan: None,
            }
        }
    }

    impl Drop for TempLibrary {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    #[tokio::test]
    async fn test_counts_series_and_chapters() {
        let library = TempLibrary::new();
        library.file("Berserk/Vol 01.cbz");
        library.file("Berserk/Vol 02.CBR");
        library.file("Berserk/notes.txt");
        library.file("Vagabond/Chapter 001/001.jpg");
        library.file("Vagabond/Chapter 001/002.jpg");
        library.file("Vagabond/Chapter 002/001.png");
        library.file("Vagabond/Extras/readme.md");
        library.file(".hidden/Vol 01.cbz");
        library.file("cover.jpg");

        let stats = FilesystemLibraryImporter::new()
            .scan_path(&library.library_path())
            .await
            .unwrap();

        assert_eq!(stats.series_found, 2);
        assert_eq!(stats.chapters_found, 4);
        assert!(stats.errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_library_scans_cleanly() {
        let library = TempLibrary::new();

        let stats = FilesystemLibraryImporter::new()
            .scan_path(&library.library_path())
            .await
            .unwrap();

        assert_eq!(stats, ScanStats::default());
    }

    #[tokio::test]
    async fn test_missing_path_is_retryable_not_found() {
        let library = TempLibrary::new();
        let mut path = library.library_path();
        path.path = library.root.join("gone").to_string_lossy().into_owned();

        let err = FilesystemLibraryImporter::new()
            .scan_path(&path)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_file_instead_of_directory_is_rejected() {
        let library = TempLibrary::new();
        library.file("single.cbz");
        let mut path = library.library_path();
        path.path = library.root.join("single.cbz").to_string_lossy().into_owned();

        let err = FilesystemLibraryImporter::new()
            .scan_path(&path)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_has_extension_ignores_case() {
        assert!(has_extension(Path::new("a/b.CBZ"), CHAPTER_EXTENSIONS));
        assert!(!has_extension(Path::new("a/b"), CHAPTER_EXTENSIONS));
        assert!(!has_extension(Path::new("a/b.txt"), CHAPTER_EXTENSIONS));
    }
}
