use crate::error::{DevpipeError, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default maximum log file size before rotation (50KB)
pub const DEFAULT_MAX_LOG_SIZE: u64 = 50 * 1024;

/// Appends lines to a single log file, rotating it by size.
///
/// The file is reopened for every append so that external deletion or a
/// changed output directory never leaves a stale handle behind.
pub struct RotatingWriter {
    /// Path to the active log file
    path: PathBuf,
    /// Maximum size in bytes before rotation
    max_size: u64,
}

impl RotatingWriter {
    pub fn new<P: AsRef<Path>>(path: P, max_size: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_size,
        }
    }

    /// Append one line, rotating first if the line would bring the file to or
    /// over the threshold.
    ///
    /// Returns the backup path when a rotation happened. The write is synced to
    /// storage before this returns.
    pub fn append_line(&self, line: &str) -> Result<Option<PathBuf>> {
        let incoming = line.len() as u64 + 1;
        let current = self.current_size();

        let rotated = if current > 0 && current + incoming >= self.max_size {
            Some(self.rotate()?)
        } else {
            None
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DevpipeError::LogFileError(format!("Failed to open log file: {}", e)))?;

        let mut entry = Vec::with_capacity(line.len() + 1);
        entry.extend_from_slice(line.as_bytes());
        entry.push(b'\n');

        file.write_all(&entry)?;
        file.sync_data()?;

        Ok(rotated)
    }

    /// Rename the active file to `<name>.<YYYYMMDD_HHMMSS>`.
    ///
    /// An existing backup with the same stamp is never overwritten; a numeric
    /// suffix is appended instead.
    pub fn rotate(&self) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DevpipeError::LogRotationError("Invalid log file name".to_string()))?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut rotated_path = self.path.with_file_name(format!("{}.{}", file_name, timestamp));
        let mut attempt = 1;
        while rotated_path.exists() {
            rotated_path = self
                .path
                .with_file_name(format!("{}.{}.{}", file_name, timestamp, attempt));
            attempt += 1;
        }

        fs::rename(&self.path, &rotated_path)
            .map_err(|e| DevpipeError::LogRotationError(format!("Failed to rotate log: {}", e)))?;

        info!(
            "Rotated {} to {}",
            self.path.display(),
            rotated_path.display()
        );
        Ok(rotated_path)
    }

    /// Current size of the active file (0 if it does not exist)
    pub fn current_size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}
