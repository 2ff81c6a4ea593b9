use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directory the library is imported from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryPath {
    pub id: Uuid,
    pub path: String,
    pub enabled: bool,
    /// Hours between automatic scans; zero or negative disables them
    pub scan_interval_hours: i32,
    pub last_scan: Option<DateTime<Utc>>,
}

impl LibraryPath {
    /// Whether the automatic scheduler should queue a scan at `now`
    pub fn is_due_for_scan(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || self.scan_interval_hours <= 0 {
            return false;
        }

        match self.last_scan {
            None => true,
            Some(last_scan) => now - last_scan >= Duration::hours(self.scan_interval_hours as i64),
        }
    }
}

/// Outcome of importing one library path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub series_found: usize,
    pub chapters_found: usize,
    /// Entries that could not be read, by name relative to the library root
    pub errors: Vec<String>,
}

impl ScanStats {
    pub fn merge(&mut self, other: ScanStats) {
        self.series_found += other.series_found;
        self.chapters_found += other.chapters_found;
        self.errors.extend(other.errors);
    }
}

/// Outcome reported by the download service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub files_downloaded: usize,
    pub bytes_downloaded: u64,
}

/// Outcome reported by the chapter update service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheckReport {
    pub series_checked: usize,
    pub new_chapters: usize,
}
