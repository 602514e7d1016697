// CLI module - User-facing command-line interface

mod output;

use crate::config::{ConfigKey, DevpipeConfig};
use crate::directory::DirectoryManager;
use crate::error::DevpipeError;
use crate::logs::{LogManager, LogRecord, UrlFilter, WriteOutcome};
use crate::merge::MergeManager;
use crate::tailer::{ingest_callback, FileTailer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/devpipe.toml";

/// Devpipe - capture, tail and merge development logs
#[derive(Parser)]
#[command(name = "devpipe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage directory tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Capture newline-delimited JSON records
    Ingest {
        /// Read records from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Write into the directory behind this token
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Show the most recent captured records
    Logs {
        /// Number of records to display
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// Show the capture log file and settings
    Info,

    /// Write the merged internal + external log file
    Merge {
        /// Only use the last N lines of the capture log
        #[arg(long)]
        internal_limit: Option<usize>,

        /// Only use the last N lines of the external log
        #[arg(long)]
        external_limit: Option<usize>,

        /// Keep internal records before external ones instead of sorting by time
        #[arg(long)]
        no_sort: bool,
    },

    /// Show size and line counts of all log files
    Stats,

    /// Clear the capture log
    Clear {
        /// Also truncate the external log and delete the merged file
        #[arg(short, long)]
        all: bool,
    },

    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Tail a file into the capture log until interrupted
    Watch {
        /// File to tail (defaults to the configured external log)
        file: Option<PathBuf>,

        /// Write into the directory behind this token
        #[arg(short, long)]
        token: Option<String>,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Register a directory and print its token
    Create {
        /// Directory to register (created if missing)
        path: PathBuf,
    },
    /// List all tokens
    List,
    /// Show the directory behind a token
    Show { token: String },
    /// Remove a token
    Remove { token: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective settings
    Show,
    /// Change a setting and save it to the configuration file
    Set {
        /// max_file_size, max_logs, external_log_path or merged_log_path
        key: ConfigKey,
        /// New value (an empty external_log_path unsets it)
        value: String,
    },
}

impl Commands {
    /// Only these commands touch the token store
    fn uses_tokens(&self) -> bool {
        match self {
            Commands::Token { .. } => true,
            Commands::Ingest { token, .. } | Commands::Watch { token, .. } => token.is_some(),
            _ => false,
        }
    }
}

/// Managers built once from the configuration and shared by every command
struct App {
    config: DevpipeConfig,
    directories: Option<Arc<DirectoryManager>>,
    log_manager: Arc<LogManager>,
    merge: MergeManager,
}

impl App {
    /// Build the managers; the token store is opened only when `with_tokens`
    fn load(config_path: &Path, with_tokens: bool) -> Result<Self> {
        let config = DevpipeConfig::from_file(config_path).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })?;

        let directories = if with_tokens {
            Some(Arc::new(
                DirectoryManager::new(&config.token_store, &config.allowed_roots)
                    .context("Failed to open the directory token store")?,
            ))
        } else {
            None
        };

        let mut log_manager = LogManager::new(&config.log_dir)?
            .with_filter(UrlFilter::new(config.url_filters.clone()));
        if let Some(directories) = &directories {
            log_manager = log_manager.with_directories(Arc::clone(directories));
        }
        log_manager.set_max_file_size(config.max_file_size);
        let log_manager = Arc::new(log_manager);

        let merge = MergeManager::from_config(Arc::clone(&log_manager), &config);

        Ok(Self {
            config,
            directories,
            log_manager,
            merge,
        })
    }

    fn directories(&self) -> Result<&DirectoryManager> {
        self.directories
            .as_deref()
            .context("Directory token store is not open")
    }

    /// Settings as the managers currently hold them
    fn effective_config(&self) -> DevpipeConfig {
        DevpipeConfig {
            max_file_size: self.log_manager.max_file_size() / 1024,
            external_log_path: self.merge.external_log_path(),
            merged_log_path: self.merge.merged_log_path(),
            ..self.config.clone()
        }
    }

    /// Apply one setting to the running managers and save the result
    fn set_config_value(
        &self,
        config_path: &Path,
        key: ConfigKey,
        value: &str,
    ) -> Result<DevpipeConfig> {
        let mut updated = self.effective_config();
        updated.set_value(key, value)?;

        match key {
            ConfigKey::MaxFileSize => self.log_manager.set_max_file_size(updated.max_file_size),
            ConfigKey::ExternalLogPath => self
                .merge
                .set_external_log_path(updated.external_log_path.clone()),
            ConfigKey::MergedLogPath => self
                .merge
                .set_merged_log_path(updated.merged_log_path.clone()),
            ConfigKey::MaxLogs => {}
        }

        let persisted = DevpipeConfig {
            max_logs: updated.max_logs,
            ..self.effective_config()
        };
        persisted.save(config_path).with_context(|| {
            format!("Failed to save configuration to {}", config_path.display())
        })?;
        Ok(persisted)
    }
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    /// Execute the parsed command
    fn execute(&self) -> Result<()> {
        let app = App::load(&self.config, self.command.uses_tokens())?;

        match &self.command {
            Commands::Token { command } => run_token(&app, command),
            Commands::Ingest { file, token } => run_ingest(&app, file.as_deref(), token.as_deref()),
            Commands::Logs { lines } => {
                let records = app
                    .log_manager
                    .get_recent_logs(lines.unwrap_or(app.config.max_logs))?;
                output::print_records(&records);
                Ok(())
            }
            Commands::Info => {
                output::print_log_file_info(
                    &app.log_manager.get_log_file_info(),
                    app.log_manager.state(),
                    app.log_manager.max_file_size(),
                    app.log_manager.output_token().as_deref(),
                );
                Ok(())
            }
            Commands::Merge {
                internal_limit,
                external_limit,
                no_sort,
            } => {
                let path = app.merge.create_merged_file(
                    *internal_limit,
                    *external_limit,
                    !*no_sort,
                )?;
                output::print_success_msg(&format!("Merged log written to {}", path.display()));
                Ok(())
            }
            Commands::Stats => {
                output::print_stats(&app.merge.get_merged_stats());
                Ok(())
            }
            Commands::Clear { all } => {
                if *all {
                    output::print_clear_result(&app.merge.clear_all_logs());
                } else if app.log_manager.clear_logs()? {
                    output::print_success_msg("Capture log cleared");
                } else {
                    output::print_info("Capture log is already empty");
                }
                Ok(())
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    output::print_settings(&app.effective_config(), &self.config);
                    Ok(())
                }
                ConfigCommands::Set { key, value } => {
                    let saved = app.set_config_value(&self.config, *key, value)?;
                    output::print_success_msg(&format!(
                        "{} = {} (saved to {})",
                        key,
                        saved.get_value(*key),
                        self.config.display()
                    ));
                    Ok(())
                }
            },
            Commands::Watch { file, token } => run_watch(&app, file.clone(), token.as_deref()),
        }
    }
}

fn run_token(app: &App, command: &TokenCommands) -> Result<()> {
    let directories = app.directories()?;
    match command {
        TokenCommands::Create { path } => {
            let token = directories.create_token(path)?;
            output::print_success_msg("Directory token created");
            println!("{}", token);
        }
        TokenCommands::List => output::print_token_table(&directories.list_tokens()),
        TokenCommands::Show { token } => {
            let info = directories
                .get_directory_info(token)
                .ok_or_else(|| DevpipeError::TokenNotFound(token.clone()))?;
            output::print_directory_info(token, &info);
        }
        TokenCommands::Remove { token } => {
            if directories.remove_token(token)? {
                output::print_success_msg(&format!("Token {} removed", token));
            } else {
                output::print_info(&format!("Token {} was not registered", token));
            }
        }
    }
    Ok(())
}

fn run_ingest(app: &App, file: Option<&Path>, token: Option<&str>) -> Result<()> {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    app.log_manager.set_output_directory_token(token)?;
    app.log_manager.start();

    let (mut accepted, mut filtered, mut rejected) = (0, 0, 0);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record = match LogRecord::from_json(&line) {
            Ok(record) => record,
            Err(e) => {
                output::print_warning(&format!("Line {}: {}", index + 1, e));
                rejected += 1;
                continue;
            }
        };

        match app.log_manager.write_log(record)? {
            WriteOutcome::Accepted => accepted += 1,
            WriteOutcome::Filtered => filtered += 1,
            WriteOutcome::Inactive => rejected += 1,
        }
    }

    app.log_manager.stop();
    output::print_ingest_summary(accepted, filtered, rejected, &app.log_manager.log_file_path());
    Ok(())
}

fn run_watch(app: &App, file: Option<PathBuf>, token: Option<&str>) -> Result<()> {
    let path = file
        .or_else(|| app.merge.external_log_path())
        .context("No file given and no external log path configured")?;

    app.log_manager.set_output_directory_token(token)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        let tailer = FileTailer::new();
        tailer.add_file(&path, Some(ingest_callback(Arc::clone(&app.log_manager))))?;

        app.log_manager.start();
        tailer.start()?;

        output::print_info("Tailing (press Ctrl-C to stop):");
        output::print_watched_files(&tailer.watched_files());

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;

        tailer.stop().await;
        app.log_manager.stop();
        output::print_success_msg("Stopped tailing");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("devpipe.toml");
        let config = DevpipeConfig {
            log_dir: temp_dir.path().join("logs"),
            merged_log_path: temp_dir.path().join("merged"),
            token_store: temp_dir.path().join("tokens.json"),
            ..Default::default()
        };
        config.save(&path).unwrap();
        path
    }

    #[test]
    fn test_set_config_value_applies_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir);
        let external = temp_dir.path().join("debug.log");

        let app = App::load(&path, false).unwrap();
        app.set_config_value(&path, ConfigKey::MaxFileSize, "3").unwrap();
        app.set_config_value(&path, ConfigKey::ExternalLogPath, external.to_str().unwrap())
            .unwrap();

        assert_eq!(app.log_manager.max_file_size(), 3 * 1024);
        assert_eq!(app.merge.external_log_path(), Some(external.clone()));

        let reloaded = App::load(&path, false).unwrap();
        assert_eq!(reloaded.config.max_file_size, 3);
        assert_eq!(reloaded.config.external_log_path, Some(external));
        assert_eq!(reloaded.config.log_dir, temp_dir.path().join("logs"));
    }

    #[test]
    fn test_invalid_setting_is_not_saved() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir);
        let before = fs::read_to_string(&path).unwrap();

        let app = App::load(&path, false).unwrap();
        assert!(app
            .set_config_value(&path, ConfigKey::MaxFileSize, "0")
            .is_err());

        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(app.log_manager.max_file_size(), 50 * 1024);
    }

    #[test]
    fn test_corrupt_token_store_only_blocks_token_commands() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir);
        fs::write(temp_dir.path().join("tokens.json"), "{not json").unwrap();

        let app = App::load(&path, false).unwrap();
        assert!(app.directories().is_err());
        assert_eq!(app.merge.get_merged_stats().internal_log.line_count, 0);

        assert!(App::load(&path, true).is_err());
    }

    #[test]
    fn test_uses_tokens() {
        assert!(Commands::Token {
            command: TokenCommands::List
        }
        .uses_tokens());
        assert!(!Commands::Stats.uses_tokens());
        assert!(!Commands::Ingest {
            file: None,
            token: None
        }
        .uses_tokens());
        assert!(Commands::Watch {
            file: None,
            token: Some("abc".to_string())
        }
        .uses_tokens());
    }
}
