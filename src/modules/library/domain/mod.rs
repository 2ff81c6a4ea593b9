pub mod entities;
pub mod repository;
pub mod services;

pub use entities::{DownloadReport, LibraryPath, ScanStats, UpdateCheckReport};
pub use repository::LibraryPathRegistry;
pub use services::{ChapterUpdateService, DownloadService, LibraryImporter};
