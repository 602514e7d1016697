use devpipe::directory::DirectoryManager;
use devpipe::logs::{LogManager, LogRecord, Scalar, UrlFilter, WriteOutcome, LOG_FILE_NAME};
use devpipe::DevpipeError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn backups(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(&format!("{}.", LOG_FILE_NAME))
        })
        .count()
}

#[test]
fn test_write_then_read_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let manager = LogManager::new(temp_dir.path()).unwrap();
    manager.start();

    let mut data = BTreeMap::new();
    data.insert("component".to_string(), Scalar::Text("checkout".to_string()));
    data.insert("retries".to_string(), Scalar::Int(3));

    let mut record = LogRecord::new("error", "Payment failed")
        .with_url("http://localhost:3000/checkout")
        .with_timestamp("2024-01-01T10:05:00.000Z")
        .with_user_agent("Mozilla/5.0");
    record.stack_trace = Some("at pay (checkout.js:42)".to_string());
    record.additional_data = Some(data);

    assert_eq!(manager.write_log(record.clone()).unwrap(), WriteOutcome::Accepted);

    let recent = manager.get_recent_logs(1).unwrap();
    assert_eq!(recent.len(), 1);
    assert!(recent[0].server_timestamp.is_some());

    let mut expected = record;
    expected.server_timestamp = recent[0].server_timestamp.clone();
    assert_eq!(recent[0], expected);
}

#[test]
fn test_rotation_before_crossing_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let manager = LogManager::new(temp_dir.path()).unwrap();
    manager.set_max_file_size(1);
    manager.start();

    let log_file = manager.log_file_path();
    let mut rotations = 0;

    for i in 0..30 {
        let before = fs::metadata(&log_file).map(|m| m.len()).unwrap_or(0);
        let record = LogRecord::new("info", format!("message {:02} {}", i, "x".repeat(120)));
        manager.write_log(record).unwrap();

        let contents = fs::read_to_string(&log_file).unwrap();
        let last_line_len = contents.lines().last().unwrap().len() as u64 + 1;

        if backups(temp_dir.path()) > rotations {
            rotations += 1;
            // The write that would cross the threshold lands alone in the new file
            assert!(before + last_line_len >= 1024);
            assert_eq!(contents.lines().count(), 1);
        } else {
            assert!(before + last_line_len < 1024);
        }
    }

    assert!(rotations >= 2);
}

#[test]
fn test_stopped_and_filtered_writes_have_no_effect() {
    let temp_dir = TempDir::new().unwrap();
    let manager = LogManager::new(temp_dir.path())
        .unwrap()
        .with_filter(UrlFilter::new(vec!["localhost".to_string()]));

    let local = LogRecord::new("info", "kept").with_url("http://localhost/app");
    let remote = LogRecord::new("info", "dropped").with_url("https://cdn.example.com");

    assert_eq!(manager.write_log(local.clone()).unwrap(), WriteOutcome::Inactive);
    assert!(!manager.log_file_path().exists());

    manager.start();
    assert_eq!(manager.write_log(remote).unwrap(), WriteOutcome::Filtered);
    assert!(!manager.log_file_path().exists());

    assert!(manager.write_log(local).unwrap().is_accepted());
    assert_eq!(manager.get_recent_logs(10).unwrap().len(), 1);
}

#[test]
fn test_redirect_only_while_stopped() {
    let temp_dir = TempDir::new().unwrap();
    let directories =
        Arc::new(DirectoryManager::new(temp_dir.path().join("tokens.json"), &[]).unwrap());
    let target = temp_dir.path().join("redirected");
    let token = directories.create_token(&target).unwrap();

    let manager = LogManager::new(temp_dir.path().join("logs"))
        .unwrap()
        .with_directories(Arc::clone(&directories));

    manager.start();
    let result = manager.set_output_directory_token(Some(&token));
    assert!(matches!(result, Err(DevpipeError::CaptureActive(_))));
    assert_eq!(manager.output_dir(), temp_dir.path().join("logs"));

    manager.stop();
    manager.set_output_directory_token(Some(&token)).unwrap();
    manager.start();
    manager.write_log(LogRecord::new("info", "redirected")).unwrap();

    assert!(fs::canonicalize(&target)
        .unwrap()
        .join(LOG_FILE_NAME)
        .exists());
    assert!(!temp_dir.path().join("logs").join(LOG_FILE_NAME).exists());
}

#[test]
fn test_concurrent_writes_stay_line_delimited() {
    let temp_dir = TempDir::new().unwrap();
    let manager = Arc::new(LogManager::new(temp_dir.path()).unwrap());
    manager.set_max_file_size(4);
    manager.start();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..25 {
                    let record = LogRecord::new("info", format!("thread {} line {}", t, i));
                    manager.write_log(record).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every line of every file (active and rotated) is a complete record
    let mut total = 0;
    for entry in fs::read_dir(temp_dir.path()).unwrap() {
        let contents = fs::read_to_string(entry.unwrap().path()).unwrap();
        for line in contents.lines() {
            assert!(LogRecord::from_line(line).is_some(), "torn line: {}", line);
            total += 1;
        }
    }
    assert_eq!(total, 100);
}

#[test]
fn test_malformed_lines_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let manager = LogManager::new(temp_dir.path()).unwrap();
    manager.start();

    manager.write_log(LogRecord::new("info", "first")).unwrap();
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(manager.log_file_path())
        .unwrap();
    std::io::Write::write_all(&mut file, b"{not json\n").unwrap();
    manager.write_log(LogRecord::new("info", "second")).unwrap();

    let recent = manager.get_recent_logs(10).unwrap();
    let messages: Vec<&str> = recent.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["second", "first"]);
}
