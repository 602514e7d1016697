use crate::directory::DirectoryManager;
use crate::error::{DevpipeError, Result};
use crate::logs::filter::{AcceptAll, AcceptFilter};
use crate::logs::reader::read_last_lines;
use crate::logs::record::LogRecord;
use crate::logs::writer::{RotatingWriter, DEFAULT_MAX_LOG_SIZE};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// File name of the capture log inside the output directory
pub const LOG_FILE_NAME: &str = "devpipe.log";

/// Capture state machine: `Stopped --start()--> Active --stop()--> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureState {
    Stopped,
    Active,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Stopped => write!(f, "stopped"),
            CaptureState::Active => write!(f, "active"),
        }
    }
}

/// Result of an ingestion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteOutcome {
    /// Written and synced to the capture log
    Accepted,
    /// Capture is stopped; nothing was written
    Inactive,
    /// Rejected by the acceptance filter; nothing was written
    Filtered,
}

impl WriteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteOutcome::Accepted)
    }
}

/// Snapshot of the active capture log file
#[derive(Debug, Clone, Serialize)]
pub struct LogFileInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub size_kb: f64,
    pub last_modified_at: Option<DateTime<Local>>,
}

/// Mutable capture state, guarded as one unit so that rotation, append and
/// directory redirection never interleave.
struct CaptureInner {
    state: CaptureState,
    output_dir: PathBuf,
    output_token: Option<String>,
    max_file_size: u64,
}

/// LogManager owns the active/inactive capture state and writes normalised
/// records to a size-rotated newline-delimited JSON file.
pub struct LogManager {
    /// Default output directory
    base_dir: PathBuf,
    /// Resolves output-directory tokens
    directories: Option<Arc<DirectoryManager>>,
    filter: Box<dyn AcceptFilter>,
    inner: Mutex<CaptureInner>,
}

impl LogManager {
    /// Create a new LogManager writing into `log_dir`
    ///
    /// # Returns
    /// * `Ok(LogManager)` - Created in the `Stopped` state
    /// * `Err(DevpipeError)` - Failed to create the log directory
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let base_dir = log_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).map_err(|e| {
            DevpipeError::LogFileError(format!("Failed to create log directory: {}", e))
        })?;

        Ok(Self {
            base_dir: base_dir.clone(),
            directories: None,
            filter: Box::new(AcceptAll),
            inner: Mutex::new(CaptureInner {
                state: CaptureState::Stopped,
                output_dir: base_dir,
                output_token: None,
                max_file_size: DEFAULT_MAX_LOG_SIZE,
            }),
        })
    }

    /// Enable output-directory redirection through directory tokens
    pub fn with_directories(mut self, directories: Arc<DirectoryManager>) -> Self {
        self.directories = Some(directories);
        self
    }

    /// Replace the acceptance filter (default keeps everything)
    pub fn with_filter<F: AcceptFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn start(&self) {
        let mut inner = self.lock_inner();
        if inner.state == CaptureState::Stopped {
            inner.state = CaptureState::Active;
            info!("Log capture started");
        }
    }

    pub fn stop(&self) {
        let mut inner = self.lock_inner();
        if inner.state == CaptureState::Active {
            inner.state = CaptureState::Stopped;
            info!("Log capture stopped");
        }
    }

    pub fn state(&self) -> CaptureState {
        self.lock_inner().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == CaptureState::Active
    }

    /// Redirect output into the directory behind `token`, or back to the base
    /// directory with `None`.
    ///
    /// # Returns
    /// * `Ok(())` - Output directory changed
    /// * `Err(DevpipeError::CaptureActive)` - Capture is running; nothing changed
    /// * `Err(DevpipeError::TokenNotFound)` - Token unknown; nothing changed
    pub fn set_output_directory_token(&self, token: Option<&str>) -> Result<()> {
        let mut inner = self.lock_inner();

        if inner.state == CaptureState::Active {
            return Err(DevpipeError::CaptureActive(
                "stop capture before changing the output directory".to_string(),
            ));
        }

        match token {
            Some(token) => {
                let directory = self
                    .directories
                    .as_ref()
                    .and_then(|d| d.get_directory(token))
                    .ok_or_else(|| DevpipeError::TokenNotFound(token.to_string()))?;

                info!("Capture output redirected to {}", directory.display());
                inner.output_dir = directory;
                inner.output_token = Some(token.to_string());
            }
            None => {
                info!("Capture output reset to {}", self.base_dir.display());
                inner.output_dir = self.base_dir.clone();
                inner.output_token = None;
            }
        }

        Ok(())
    }

    /// Write one record to the capture log.
    ///
    /// Stamps `server_timestamp`, rotates when needed and syncs the line to
    /// storage before returning `Accepted`.
    pub fn write_log(&self, mut record: LogRecord) -> Result<WriteOutcome> {
        let inner = self.lock_inner();

        if inner.state == CaptureState::Stopped {
            return Ok(WriteOutcome::Inactive);
        }

        if !self.filter.accept(&record) {
            debug!("Record filtered out (url: {})", record.url);
            return Ok(WriteOutcome::Filtered);
        }

        record.server_timestamp = Some(Local::now().to_rfc3339());
        let line = record.to_line()?;

        fs::create_dir_all(&inner.output_dir).map_err(|e| {
            DevpipeError::LogFileError(format!("Failed to create log directory: {}", e))
        })?;

        let writer = RotatingWriter::new(inner.output_dir.join(LOG_FILE_NAME), inner.max_file_size);
        writer.append_line(&line)?;

        Ok(WriteOutcome::Accepted)
    }

    /// The last `limit` parseable records of the active file, newest first.
    /// Malformed lines are skipped.
    pub fn get_recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let lines = read_last_lines(&self.log_file_path(), None)?;

        let mut skipped = 0;
        let records: Vec<LogRecord> = lines
            .iter()
            .rev()
            .filter_map(|line| {
                let parsed = LogRecord::from_line(line);
                if parsed.is_none() {
                    skipped += 1;
                }
                parsed
            })
            .take(limit)
            .collect();

        if skipped > 0 {
            debug!("Skipped {} malformed capture log line(s)", skipped);
        }

        Ok(records)
    }

    /// Delete the active file; `Ok(false)` if there was none
    pub fn clear_logs(&self) -> Result<bool> {
        let inner = self.lock_inner();
        let path = inner.output_dir.join(LOG_FILE_NAME);

        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path)?;
        info!("Cleared capture log {}", path.display());
        Ok(true)
    }

    pub fn set_max_file_size(&self, size_kb: u64) {
        self.lock_inner().max_file_size = size_kb.max(1) * 1024;
    }

    /// Rotation threshold in bytes
    pub fn max_file_size(&self) -> u64 {
        self.lock_inner().max_file_size
    }

    pub fn get_log_file_info(&self) -> LogFileInfo {
        let path = self.log_file_path();
        let metadata = fs::metadata(&path).ok();
        let size_bytes = metadata.as_ref().map(|m| m.len()).unwrap_or(0);

        LogFileInfo {
            exists: metadata.is_some(),
            size_bytes,
            size_kb: size_bytes as f64 / 1024.0,
            last_modified_at: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Local>::from),
            path,
        }
    }

    /// Path of the active capture log
    pub fn log_file_path(&self) -> PathBuf {
        self.lock_inner().output_dir.join(LOG_FILE_NAME)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.lock_inner().output_dir.clone()
    }

    pub fn output_token(&self) -> Option<String> {
        self.lock_inner().output_token.clone()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn lock_inner(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
