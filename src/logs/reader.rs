use crate::error::{DevpipeError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read non-empty lines from a log file, optionally keeping only the last `limit`.
///
/// Invalid UTF-8 is replaced rather than rejected, since external log files are
/// not guaranteed to be clean. A missing file yields no lines.
///
/// # Arguments
/// * `file_path` - Path to the log file
/// * `limit` - Number of lines to keep from the end (`None` = all)
pub fn read_last_lines(file_path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(file_path)
        .map_err(|e| DevpipeError::LogFileError(format!("Failed to open log file: {}", e)))?;

    let mut all_lines = Vec::new();
    for chunk in BufReader::new(file).split(b'\n') {
        let chunk = chunk?;
        let line = String::from_utf8_lossy(&chunk);
        let line = line.trim_end();
        if !line.is_empty() {
            all_lines.push(line.to_string());
        }
    }

    if let Some(limit) = limit {
        if all_lines.len() > limit {
            all_lines.drain(..all_lines.len() - limit);
        }
    }

    Ok(all_lines)
}

/// Count newline-terminated lines (plus a trailing partial line, if any)
pub fn count_lines(file_path: &Path) -> Result<usize> {
    let file = File::open(file_path)
        .map_err(|e| DevpipeError::LogFileError(format!("Failed to open log file: {}", e)))?;

    let mut count = 0;
    for chunk in BufReader::new(file).split(b'\n') {
        chunk?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let lines = read_last_lines(&temp_dir.path().join("none.log"), None).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_read_last_lines_with_limit() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("test.log");
        fs::write(&log_file, "Line 1\nLine 2\n\nLine 3\n").unwrap();

        let lines = read_last_lines(&log_file, Some(2)).unwrap();
        assert_eq!(lines, vec!["Line 2", "Line 3"]);

        let all = read_last_lines(&log_file, None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_read_tolerates_invalid_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("bin.log");
        fs::write(&log_file, b"ok\n\xff\xfe broken\r\n").unwrap();

        let lines = read_last_lines(&log_file, None).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "ok");
        assert!(lines[1].ends_with("broken"));
    }

    #[test]
    fn test_count_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("count.log");

        fs::write(&log_file, "").unwrap();
        assert_eq!(count_lines(&log_file).unwrap(), 0);

        fs::write(&log_file, "a\nb\n").unwrap();
        assert_eq!(count_lines(&log_file).unwrap(), 2);

        fs::write(&log_file, "a\nb").unwrap();
        assert_eq!(count_lines(&log_file).unwrap(), 2);
    }
}
