use super::registry::ChangeCallback;
use crate::logs::{LogManager, LogRecord};
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Level recorded for lines ingested from a tailed file
pub const EXTERNAL_LEVEL: &str = "external";

/// User agent recorded for lines ingested from a tailed file
pub const TAILER_USER_AGENT: &str = "file_watcher";

/// Build the record written for one line of a tailed file
pub fn external_record(path: &Path, line: &str) -> LogRecord {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    LogRecord::new(EXTERNAL_LEVEL, line)
        .with_url(format!("file://{}", path.display()))
        .with_timestamp(Local::now().to_rfc3339())
        .with_user_agent(TAILER_USER_AGENT)
        .with_source(source)
}

/// Change callback that writes every new line through the capture engine.
///
/// Lines arriving while capture is stopped are dropped by the engine.
pub fn ingest_callback(log_manager: Arc<LogManager>) -> ChangeCallback {
    Arc::new(move |path: &Path, lines: &[String]| {
        for line in lines {
            if let Err(e) = log_manager.write_log(external_record(path, line)) {
                warn!("Failed to ingest line from {}: {}", path.display(), e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_external_record_fields() {
        let record = external_record(Path::new("/var/log/wp/debug.log"), "PHP Notice: x");

        assert_eq!(record.level, "external");
        assert_eq!(record.message, "PHP Notice: x");
        assert_eq!(record.url, "file:///var/log/wp/debug.log");
        assert_eq!(record.user_agent, "file_watcher");
        assert_eq!(record.source.as_deref(), Some("debug.log"));
        assert!(!record.timestamp.is_empty());
    }

    #[test]
    fn test_ingest_callback_writes_when_active() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(LogManager::new(temp_dir.path()).unwrap());
        let callback = ingest_callback(Arc::clone(&manager));
        let lines = vec!["one".to_string(), "two".to_string()];

        callback(Path::new("/tmp/ext.log"), &lines);
        assert!(manager.get_recent_logs(10).unwrap().is_empty());

        manager.start();
        callback(Path::new("/tmp/ext.log"), &lines);

        let recent = manager.get_recent_logs(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "two");
        assert_eq!(recent[1].source.as_deref(), Some("ext.log"));
    }
}
