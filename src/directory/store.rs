// Token store - durable persistence of token -> directory mappings

use crate::error::{DevpipeError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// On-disk shape: a JSON object mapping token strings to absolute paths
pub type TokenMap = BTreeMap<String, PathBuf>;

/// Handles persistence of the token map to disk
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load mappings from disk; a missing file is an empty store
    pub fn load(&self) -> Result<TokenMap> {
        if !self.path.exists() {
            return Ok(TokenMap::new());
        }

        let file = File::open(&self.path).map_err(|e| {
            DevpipeError::TokenStoreError(format!("Failed to open token store: {}", e))
        })?;

        let tokens: TokenMap = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            DevpipeError::TokenStoreError(format!("Failed to parse token store: {}", e))
        })?;

        for (token, path) in &tokens {
            if !path.is_absolute() {
                return Err(DevpipeError::TokenStoreError(format!(
                    "Token {} maps to a non-absolute path: {}",
                    token,
                    path.display()
                )));
            }
        }

        Ok(tokens)
    }

    /// Rewrite the whole store: temp file, fsync, then rename over the original
    pub fn save(&self, tokens: &TokenMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    DevpipeError::TokenStoreError(format!(
                        "Failed to create token store directory: {}",
                        e
                    ))
                })?;
            }
        }

        let temp_path = self.path.with_extension("tmp");

        {
            let file = File::create(&temp_path).map_err(|e| {
                DevpipeError::TokenStoreError(format!("Failed to create temp token store: {}", e))
            })?;

            let mut writer = BufWriter::new(file);

            serde_json::to_writer_pretty(&mut writer, tokens).map_err(|e| {
                DevpipeError::TokenStoreError(format!("Failed to serialize tokens: {}", e))
            })?;

            writer.flush().map_err(|e| {
                DevpipeError::TokenStoreError(format!("Failed to flush token store: {}", e))
            })?;

            writer.get_ref().sync_all().map_err(|e| {
                DevpipeError::TokenStoreError(format!("Failed to sync token store: {}", e))
            })?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            DevpipeError::TokenStoreError(format!("Failed to rename temp token store: {}", e))
        })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
