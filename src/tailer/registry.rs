use crate::error::{DevpipeError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Invoked with a file's path and the lines appended since the last read
pub type ChangeCallback = Arc<dyn Fn(&Path, &[String]) + Send + Sync>;

/// Read position of one tailed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFileState {
    pub absolute_path: PathBuf,
    /// Only moves backwards (to 0) when truncation is detected
    pub last_read_offset: u64,
    pub last_modified_at: SystemTime,
}

/// Listing entry for a tailed file
#[derive(Debug, Clone, Serialize)]
pub struct WatchedFileInfo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Local>,
}

struct WatchedFile {
    state: WatchedFileState,
    callback: Option<ChangeCallback>,
}

/// Registered files and the directories that must be watched to see them
#[derive(Default)]
pub(crate) struct Registry {
    files: HashMap<PathBuf, WatchedFile>,
    /// Parent directory -> number of registered files inside it
    directories: HashMap<PathBuf, usize>,
}

impl Registry {
    /// Register a file at its current size.
    ///
    /// Returns the parent directory when it was not watched before.
    pub(crate) fn add(
        &mut self,
        path: &Path,
        callback: Option<ChangeCallback>,
    ) -> Result<Option<PathBuf>> {
        let absolute_path = fs::canonicalize(path).map_err(|e| {
            DevpipeError::InvalidPath(format!("Cannot watch {}: {}", path.display(), e))
        })?;

        let metadata = fs::metadata(&absolute_path)?;
        if !metadata.is_file() {
            return Err(DevpipeError::InvalidPath(format!(
                "Not a regular file: {}",
                absolute_path.display()
            )));
        }

        if self.files.contains_key(&absolute_path) {
            return Err(DevpipeError::AlreadyWatched(
                absolute_path.display().to_string(),
            ));
        }

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| DevpipeError::InvalidPath(absolute_path.display().to_string()))?;

        self.files.insert(
            absolute_path.clone(),
            WatchedFile {
                state: WatchedFileState {
                    absolute_path,
                    last_read_offset: metadata.len(),
                    last_modified_at: metadata.modified()?,
                },
                callback,
            },
        );

        let count = self.directories.entry(parent.clone()).or_insert(0);
        *count += 1;
        Ok((*count == 1).then_some(parent))
    }

    /// Deregister a file.
    ///
    /// `None` if it was not registered; `Some(Some(dir))` when its parent
    /// directory no longer has any registered file.
    pub(crate) fn remove(&mut self, path: &Path) -> Option<Option<PathBuf>> {
        let key = self.key_for(path)?;
        self.files.remove(&key)?;

        let parent = key.parent()?.to_path_buf();
        let remaining = match self.directories.get_mut(&parent) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        };

        if remaining == 0 {
            self.directories.remove(&parent);
            Some(Some(parent))
        } else {
            Some(None)
        }
    }

    /// Lines appended since the last read.
    ///
    /// A file smaller than the stored offset was truncated or replaced, so it
    /// is read again from the start. The offset always advances to the current
    /// size.
    pub(crate) fn read_new_lines(&mut self, path: &Path) -> Result<Vec<String>> {
        let key = self
            .key_for(path)
            .ok_or_else(|| DevpipeError::InvalidPath(format!("Not watched: {}", path.display())))?;
        let Some(watched) = self.files.get_mut(&key) else {
            return Ok(Vec::new());
        };
        let state = &mut watched.state;

        let metadata = fs::metadata(&state.absolute_path)?;
        let current_size = metadata.len();

        if current_size < state.last_read_offset {
            tracing::info!(
                "Truncation detected on {}, re-reading from start",
                state.absolute_path.display()
            );
            state.last_read_offset = 0;
        }

        let mut lines = Vec::new();
        if current_size > state.last_read_offset {
            let mut file = File::open(&state.absolute_path)?;
            file.seek(SeekFrom::Start(state.last_read_offset))?;

            let mut buffer = Vec::with_capacity((current_size - state.last_read_offset) as usize);
            file.take(current_size - state.last_read_offset)
                .read_to_end(&mut buffer)?;

            lines = String::from_utf8_lossy(&buffer)
                .lines()
                .map(|line| line.trim_end().to_string())
                .filter(|line| !line.is_empty())
                .collect();
        }

        state.last_read_offset = current_size;
        state.last_modified_at = metadata.modified()?;

        Ok(lines)
    }

    pub(crate) fn callback(&self, path: &Path) -> Option<ChangeCallback> {
        self.files.get(path).and_then(|f| f.callback.clone())
    }

    pub(crate) fn state(&self, path: &Path) -> Option<WatchedFileState> {
        let key = self.key_for(path)?;
        self.files.get(&key).map(|f| f.state.clone())
    }

    pub(crate) fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub(crate) fn directories(&self) -> impl Iterator<Item = &PathBuf> {
        self.directories.keys()
    }

    pub(crate) fn infos(&self) -> Vec<WatchedFileInfo> {
        let mut infos: Vec<WatchedFileInfo> = self
            .files
            .values()
            .filter_map(|f| {
                let path = &f.state.absolute_path;
                match fs::metadata(path) {
                    Ok(metadata) => Some(WatchedFileInfo {
                        path: path.clone(),
                        name: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        size: metadata.len(),
                        last_modified: f.state.last_modified_at.into(),
                    }),
                    Err(e) => {
                        tracing::warn!("Failed to stat {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn clear(&mut self) {
        self.files.clear();
        self.directories.clear();
    }

    /// Registered key for a path given in any form
    fn key_for(&self, path: &Path) -> Option<PathBuf> {
        if self.files.contains_key(path) {
            return Some(path.to_path_buf());
        }
        if let Ok(canonical) = fs::canonicalize(path) {
            if self.files.contains_key(&canonical) {
                return Some(canonical);
            }
        }
        // The file may be gone already; match on canonical parent + name
        let parent = fs::canonicalize(path.parent()?).ok()?;
        let candidate = parent.join(path.file_name()?);
        self.files.contains_key(&candidate).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_add_starts_at_current_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "old line\n").unwrap();

        let mut registry = Registry::default();
        let dir = registry.add(&path, None).unwrap();
        assert_eq!(dir, Some(fs::canonicalize(temp_dir.path()).unwrap()));

        let state = registry.state(&path).unwrap();
        assert_eq!(state.last_read_offset, 9);
        assert!(registry.read_new_lines(&path).unwrap().is_empty());
    }

    #[test]
    fn test_add_rejects_missing_and_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");

        let mut registry = Registry::default();
        assert!(matches!(
            registry.add(&path, None),
            Err(DevpipeError::InvalidPath(_))
        ));

        fs::write(&path, "").unwrap();
        registry.add(&path, None).unwrap();
        assert!(matches!(
            registry.add(&path, None),
            Err(DevpipeError::AlreadyWatched(_))
        ));
    }

    #[test]
    fn test_read_appended_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "").unwrap();

        let mut registry = Registry::default();
        registry.add(&path, None).unwrap();

        append(&path, "first  \n\n   \nsecond\n");
        assert_eq!(
            registry.read_new_lines(&path).unwrap(),
            vec!["first", "second"]
        );
        assert!(registry.read_new_lines(&path).unwrap().is_empty());

        append(&path, "third\n");
        assert_eq!(registry.read_new_lines(&path).unwrap(), vec!["third"]);
        assert_eq!(registry.state(&path).unwrap().last_read_offset, 26);
    }

    #[test]
    fn test_truncation_rereads_from_start() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "a long line that sets the offset\n").unwrap();

        let mut registry = Registry::default();
        registry.add(&path, None).unwrap();

        fs::write(&path, "new\n").unwrap();
        assert_eq!(registry.read_new_lines(&path).unwrap(), vec!["new"]);
        assert_eq!(registry.state(&path).unwrap().last_read_offset, 4);
    }

    #[test]
    fn test_shared_directory_refcount() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.log");
        let b = temp_dir.path().join("b.log");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        let mut registry = Registry::default();
        assert!(registry.add(&a, None).unwrap().is_some());
        assert!(registry.add(&b, None).unwrap().is_none());

        assert_eq!(registry.remove(&a), Some(None));
        assert!(registry.remove(&b).unwrap().is_some());
        assert_eq!(registry.remove(&b), None);
        assert_eq!(registry.directories().count(), 0);
    }

    #[test]
    fn test_infos() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, "12345").unwrap();

        let mut registry = Registry::default();
        registry.add(&path, None).unwrap();

        let infos = registry.infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "app.log");
        assert_eq!(infos[0].size, 5);
    }
}
