use crate::config::DevpipeConfig;
use crate::error::{DevpipeError, Result};
use crate::logs::{count_lines, read_last_lines, LogManager, LogRecord};
use crate::merge::record::{ClearResult, FileStats, MergedLogRecord, MergedStats, SourceType};
use crate::merge::timestamp::parse_timestamp;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// File name used when the merged path is configured as a directory
pub const MERGED_FILE_NAME: &str = "devpipe_merged.log";

/// Level given to free-text lines of the external log
const EXTERNAL_LEVEL: &str = "external";

struct MergeSettings {
    external_log_path: Option<PathBuf>,
    merged_log_path: PathBuf,
}

/// MergeManager combines the capture log with an externally written log
/// file into one time-ordered view.
pub struct MergeManager {
    log_manager: Arc<LogManager>,
    settings: Mutex<MergeSettings>,
}

impl MergeManager {
    /// Create a new MergeManager
    ///
    /// # Arguments
    /// * `log_manager` - Capture engine whose active file is the internal stream
    /// * `external_log_path` - Externally written log file, if any
    /// * `merged_log_path` - Merged file or directory to write it into
    pub fn new(
        log_manager: Arc<LogManager>,
        external_log_path: Option<PathBuf>,
        merged_log_path: PathBuf,
    ) -> Self {
        Self {
            log_manager,
            settings: Mutex::new(MergeSettings {
                external_log_path,
                merged_log_path,
            }),
        }
    }

    pub fn from_config(log_manager: Arc<LogManager>, config: &DevpipeConfig) -> Self {
        Self::new(
            log_manager,
            config.external_log_path.clone(),
            config.merged_log_path.clone(),
        )
    }

    pub fn external_log_path(&self) -> Option<PathBuf> {
        self.lock_settings().external_log_path.clone()
    }

    pub fn set_external_log_path(&self, path: Option<PathBuf>) {
        self.lock_settings().external_log_path = path;
    }

    /// Merged path as configured (file or directory)
    pub fn merged_log_path(&self) -> PathBuf {
        self.lock_settings().merged_log_path.clone()
    }

    pub fn set_merged_log_path(&self, path: PathBuf) {
        self.lock_settings().merged_log_path = path;
    }

    /// The file the merged view is written to.
    ///
    /// An existing directory, or a path without an extension, gets
    /// [`MERGED_FILE_NAME`] appended.
    pub fn merged_file_path(&self) -> PathBuf {
        let configured = self.merged_log_path();

        if configured.is_dir() || configured.extension().is_none() {
            configured.join(MERGED_FILE_NAME)
        } else {
            configured
        }
    }

    /// Records of the capture log, oldest first.
    ///
    /// `limit` keeps only the last lines of the file. Malformed lines are
    /// skipped and read failures yield no records.
    pub fn get_internal_logs(&self, limit: Option<usize>) -> Vec<MergedLogRecord> {
        let path = self.log_manager.log_file_path();
        let lines = match read_last_lines(&path, limit) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Failed to read internal log {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        let total = lines.len();
        let records: Vec<MergedLogRecord> = lines
            .iter()
            .filter_map(|line| LogRecord::from_line(line))
            .map(|record| {
                let (timestamp, parsed_timestamp) = internal_timestamp(&record);
                MergedLogRecord {
                    source_type: SourceType::Internal,
                    timestamp,
                    parsed_timestamp,
                    level: record.level,
                    message: record.message,
                }
            })
            .collect();

        if records.len() < total {
            debug!("Skipped {} malformed internal line(s)", total - records.len());
        }
        records
    }

    /// Lines of the external log, oldest first.
    ///
    /// A leading `[timestamp]` is parsed and removed from the message; lines
    /// without one are stamped with the current time.
    pub fn get_external_logs(&self, limit: Option<usize>) -> Vec<MergedLogRecord> {
        let Some(path) = self.external_log_path() else {
            return Vec::new();
        };

        match read_last_lines(&path, limit) {
            Ok(lines) => lines
                .iter()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .map(parse_external_line)
                .collect(),
            Err(e) => {
                warn!("Failed to read external log {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Internal records followed by external ones, optionally stable-sorted
    /// by time.
    pub fn merge_logs(
        &self,
        internal_limit: Option<usize>,
        external_limit: Option<usize>,
        sort_by_time: bool,
    ) -> Vec<MergedLogRecord> {
        let mut records = self.get_internal_logs(internal_limit);
        records.extend(self.get_external_logs(external_limit));

        if sort_by_time {
            records.sort_by_key(|r| r.parsed_timestamp);
        }
        records
    }

    /// Render one merged record as `[timestamp] [  SOURCE] message`
    pub fn format_for_merged_file(record: &MergedLogRecord) -> String {
        format!(
            "[{}] [{:>8}] {}",
            record.timestamp, record.source_type, record.message
        )
    }

    /// Write the merged view to [`merged_file_path`](Self::merged_file_path),
    /// replacing any previous content.
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Path of the written file
    /// * `Err(DevpipeError)` - The file could not be created or written
    pub fn create_merged_file(
        &self,
        internal_limit: Option<usize>,
        external_limit: Option<usize>,
        sort_by_time: bool,
    ) -> Result<PathBuf> {
        let records = self.merge_logs(internal_limit, external_limit, sort_by_time);
        let path = self.merged_file_path();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                DevpipeError::LogFileError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = File::create(&path).map_err(|e| {
            DevpipeError::LogFileError(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        for record in &records {
            writeln!(writer, "{}", Self::format_for_merged_file(record))?;
        }
        writer.flush()?;

        info!("Wrote {} merged record(s) to {}", records.len(), path.display());
        Ok(path)
    }

    /// Size and line count of the internal, external and merged files
    pub fn get_merged_stats(&self) -> MergedStats {
        MergedStats {
            internal_log: file_stats(&self.log_manager.log_file_path()),
            external_log: self
                .external_log_path()
                .map(|p| file_stats(&p))
                .unwrap_or_default(),
            merged_log: file_stats(&self.merged_file_path()),
        }
    }

    /// Clear the internal log, truncate the external log and delete the
    /// merged file.
    ///
    /// Each step runs regardless of the others; its flag is true only if that
    /// step found a file and succeeded.
    pub fn clear_all_logs(&self) -> ClearResult {
        let mut result = ClearResult::default();

        match self.log_manager.clear_logs() {
            Ok(cleared) => result.internal_cleared = cleared,
            Err(e) => warn!("Failed to clear internal log: {}", e),
        }

        if let Some(path) = self.external_log_path().filter(|p| p.exists()) {
            match File::create(&path) {
                Ok(_) => result.external_cleared = true,
                Err(e) => warn!("Failed to truncate {}: {}", path.display(), e),
            }
        }

        let merged = self.merged_file_path();
        if merged.exists() {
            match fs::remove_file(&merged) {
                Ok(()) => result.merged_cleared = true,
                Err(e) => warn!("Failed to remove {}: {}", merged.display(), e),
            }
        }

        info!(
            "Cleared logs (internal: {}, external: {}, merged: {})",
            result.internal_cleared, result.external_cleared, result.merged_cleared
        );
        result
    }

    fn lock_settings(&self) -> MutexGuard<'_, MergeSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Caller timestamp, then server timestamp, then the current time
fn internal_timestamp(record: &LogRecord) -> (String, DateTime<Utc>) {
    let candidates = [Some(record.timestamp.as_str()), record.server_timestamp.as_deref()];

    for candidate in candidates.into_iter().flatten() {
        if let Some(parsed) = parse_timestamp(candidate) {
            return (candidate.to_string(), parsed.instant);
        }
    }

    let now = Utc::now();
    (now.to_rfc3339(), now)
}

fn parse_external_line(line: &str) -> MergedLogRecord {
    let bracketed = line
        .strip_prefix('[')
        .and_then(|rest| rest.find(']').map(|end| (&rest[..end], &rest[end + 1..])));

    if let Some((stamp, rest)) = bracketed {
        if let Some(parsed) = parse_timestamp(stamp) {
            return MergedLogRecord {
                source_type: SourceType::External,
                timestamp: parsed.iso,
                parsed_timestamp: parsed.instant,
                level: EXTERNAL_LEVEL.to_string(),
                message: rest.trim().to_string(),
            };
        }
    }

    let now = Utc::now();
    MergedLogRecord {
        source_type: SourceType::External,
        timestamp: now.to_rfc3339(),
        parsed_timestamp: now,
        level: EXTERNAL_LEVEL.to_string(),
        message: line.to_string(),
    }
}

fn file_stats(path: &Path) -> FileStats {
    let Ok(metadata) = fs::metadata(path) else {
        return FileStats::default();
    };

    let line_count = count_lines(path).unwrap_or_else(|e| {
        warn!("Failed to count lines in {}: {}", path.display(), e);
        0
    });

    FileStats {
        exists: true,
        size_kb: (metadata.len() as f64 / 1024.0 * 100.0).round() / 100.0,
        line_count,
    }
}
