/// Library context
///
/// Library paths the scheduler scans, and the ports for the services that
/// execute scans, downloads and chapter update checks.
pub mod domain;
pub mod infrastructure;

pub use domain::{
    ChapterUpdateService, DownloadReport, DownloadService, LibraryImporter, LibraryPath,
    LibraryPathRegistry, ScanStats, UpdateCheckReport,
};
pub use infrastructure::{
    FilesystemLibraryImporter, InMemoryLibraryPathRegistry, LibraryPathRepositoryImpl,
};
