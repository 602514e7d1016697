use super::store::{TokenMap, TokenStore};
use crate::error::{DevpipeError, Result};
use chrono::{DateTime, Local};
use rand::RngCore;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Number of random bytes behind each token (hex-encoded to twice as many chars)
const TOKEN_BYTES: usize = 32;

/// A token -> directory mapping entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryToken {
    pub token: String,
    pub absolute_path: PathBuf,
}

/// Live view of a token's directory, computed from the filesystem at call time
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub is_writable: bool,
    pub created_at: Option<DateTime<Local>>,
    pub last_modified_at: Option<DateTime<Local>>,
}

/// Maps opaque tokens to validated absolute directories.
///
/// Directories must resolve inside one of the configured allowed roots. With no
/// roots configured any absolute directory is accepted. Every mutation rewrites
/// the persisted token store.
pub struct DirectoryManager {
    store: TokenStore,
    /// Allowed roots, both as given (normalised) and canonicalised
    allowed_roots: Vec<PathBuf>,
    tokens: Mutex<TokenMap>,
}

impl DirectoryManager {
    /// Open a manager backed by the token store at `store_path`
    ///
    /// # Arguments
    /// * `store_path` - JSON file holding the persisted mappings
    /// * `allowed_roots` - Directories tokens may point into (empty = unrestricted)
    ///
    /// # Returns
    /// * `Ok(DirectoryManager)` - Store loaded (or empty if absent)
    /// * `Err(DevpipeError)` - Store unreadable or a root is not absolute
    pub fn new<P: AsRef<Path>>(store_path: P, allowed_roots: &[PathBuf]) -> Result<Self> {
        let store = TokenStore::new(store_path);
        let tokens = store.load()?;

        let mut roots = Vec::new();
        for root in allowed_roots {
            if !root.is_absolute() {
                return Err(DevpipeError::InvalidPath(format!(
                    "Allowed root must be absolute: {}",
                    root.display()
                )));
            }
            let normalized = normalize(root)?;
            if let Ok(canonical) = fs::canonicalize(&normalized) {
                if canonical != normalized {
                    roots.push(canonical);
                }
            }
            roots.push(normalized);
        }

        debug!(
            "Loaded {} directory token(s) from {}",
            tokens.len(),
            store.path().display()
        );

        Ok(Self {
            store,
            allowed_roots: roots,
            tokens: Mutex::new(tokens),
        })
    }

    /// Create a token for a directory, creating the directory if needed
    ///
    /// # Returns
    /// * `Ok(String)` - The new token
    /// * `Err(DevpipeError)` - Path unusable, outside the allowed roots, or not persisted
    pub fn create_token<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let absolute_path = self.resolve_directory(path.as_ref())?;

        let mut tokens = self.lock_tokens();
        let token = loop {
            let candidate = generate_token();
            if !tokens.contains_key(&candidate) {
                break candidate;
            }
        };

        tokens.insert(token.clone(), absolute_path.clone());
        if let Err(e) = self.store.save(&tokens) {
            tokens.remove(&token);
            return Err(e);
        }

        info!("Created directory token for {}", absolute_path.display());
        Ok(token)
    }

    /// Look up the directory behind a token
    pub fn get_directory(&self, token: &str) -> Option<PathBuf> {
        self.lock_tokens().get(token).cloned()
    }

    /// Remove a token; `Ok(false)` if it did not exist
    pub fn remove_token(&self, token: &str) -> Result<bool> {
        let mut tokens = self.lock_tokens();
        let Some(path) = tokens.remove(token) else {
            return Ok(false);
        };

        if let Err(e) = self.store.save(&tokens) {
            tokens.insert(token.to_string(), path);
            return Err(e);
        }

        info!("Removed directory token for {}", path.display());
        Ok(true)
    }

    /// All mappings, ordered by token
    pub fn list_tokens(&self) -> Vec<DirectoryToken> {
        self.lock_tokens()
            .iter()
            .map(|(token, path)| DirectoryToken {
                token: token.clone(),
                absolute_path: path.clone(),
            })
            .collect()
    }

    /// Filesystem details for a token's directory, or `None` for an unknown token
    pub fn get_directory_info(&self, token: &str) -> Option<DirectoryInfo> {
        let path = self.get_directory(token)?;

        let metadata = fs::metadata(&path).ok();
        let exists = metadata.is_some();
        let created_at = metadata
            .as_ref()
            .and_then(|m| m.created().ok())
            .map(DateTime::<Local>::from);
        let last_modified_at = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Local>::from);
        let is_writable = exists && is_writable(&path, metadata.as_ref());

        Some(DirectoryInfo {
            path,
            exists,
            is_writable,
            created_at,
            last_modified_at,
        })
    }

    pub fn token_count(&self) -> usize {
        self.lock_tokens().len()
    }

    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Validate a requested directory and return its canonical absolute form.
    ///
    /// Before anything is created, the deepest existing ancestor is canonicalised
    /// and the missing components are appended to it; that path must lie inside
    /// the roots. The final canonical path is checked again after creation.
    fn resolve_directory(&self, path: &Path) -> Result<PathBuf> {
        if path.as_os_str().is_empty() {
            return Err(DevpipeError::InvalidPath("Empty directory path".to_string()));
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let normalized = normalize(&absolute)?;
        self.check_roots(&normalized)?;
        self.check_roots(&resolve_existing_prefix(&normalized)?)?;

        fs::create_dir_all(&normalized).map_err(|e| {
            DevpipeError::InvalidPath(format!(
                "Failed to create directory {}: {}",
                normalized.display(),
                e
            ))
        })?;

        let canonical = fs::canonicalize(&normalized).map_err(|e| {
            DevpipeError::InvalidPath(format!(
                "Failed to canonicalize {}: {}",
                normalized.display(),
                e
            ))
        })?;

        if !canonical.is_dir() {
            return Err(DevpipeError::InvalidPath(format!(
                "Not a directory: {}",
                canonical.display()
            )));
        }

        self.check_roots(&canonical)?;
        Ok(canonical)
    }

    fn check_roots(&self, path: &Path) -> Result<()> {
        if self.allowed_roots.is_empty()
            || self.allowed_roots.iter().any(|root| path.starts_with(root))
        {
            Ok(())
        } else {
            Err(DevpipeError::PathOutsideRoots(path.display().to_string()))
        }
    }

    fn lock_tokens(&self) -> MutexGuard<'_, TokenMap> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolve `.` and `..` lexically; `..` above the filesystem root is rejected
fn normalize(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(DevpipeError::InvalidPath(format!(
                        "Path escapes the filesystem root: {}",
                        path.display()
                    )));
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Ok(normalized)
}

/// Canonicalise the deepest existing ancestor of `path` and re-attach the
/// components that do not exist yet.
///
/// Missing components cannot be symlinks, so the result is where
/// `create_dir_all` would actually place the directory.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();

    // symlink_metadata so a dangling link counts as existing and fails to canonicalise
    while fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = fs::canonicalize(existing).map_err(|e| {
        DevpipeError::InvalidPath(format!(
            "Failed to canonicalize {}: {}",
            existing.display(),
            e
        ))
    })?;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    // Thread-local CSPRNG, seeded from the OS
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(unix)]
fn is_writable(path: &Path, _metadata: Option<&fs::Metadata>) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(_path: &Path, metadata: Option<&fs::Metadata>) -> bool {
    metadata.map(|m| !m.permissions().readonly()).unwrap_or(false)
}
