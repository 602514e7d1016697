// Output formatting and display for CLI

use crate::config::{ConfigKey, DevpipeConfig};
use crate::directory::{DirectoryInfo, DirectoryToken};
use crate::logs::{CaptureState, LogFileInfo, LogRecord};
use crate::merge::{ClearResult, FileStats, MergedStats};
use crate::tailer::WatchedFileInfo;
use chrono::{DateTime, Local};
use colored::*;
use std::path::Path;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print a warning message to stderr
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a success message
pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a formatted table of directory tokens
pub fn print_token_table(tokens: &[DirectoryToken]) {
    if tokens.is_empty() {
        println!("{}", "No directory tokens registered".yellow());
        return;
    }

    #[derive(Tabled)]
    struct TokenRow {
        #[tabled(rename = "Token")]
        token: String,
        #[tabled(rename = "Directory")]
        directory: String,
    }

    let rows: Vec<TokenRow> = tokens
        .iter()
        .map(|t| TokenRow {
            token: truncate(&t.token, 20),
            directory: t.absolute_path.display().to_string(),
        })
        .collect();

    print_table(Table::new(rows));
    println!(
        "{}",
        format!("Total: {} token(s)", tokens.len()).dimmed().italic()
    );
}

/// Print detailed view of the directory behind a token
pub fn print_directory_info(token: &str, info: &DirectoryInfo) {
    println!("\n{}", "Directory Details".bold().underline());
    println!();
    println!("  {:<15} {}", "Token:".bold(), token.cyan());
    println!("  {:<15} {}", "Path:".bold(), info.path.display());
    println!("  {:<15} {}", "Exists:".bold(), format_flag(info.exists));
    println!("  {:<15} {}", "Writable:".bold(), format_flag(info.is_writable));
    println!(
        "  {:<15} {}",
        "Created:".bold(),
        format_time(info.created_at.as_ref())
    );
    println!(
        "  {:<15} {}",
        "Modified:".bold(),
        format_time(info.last_modified_at.as_ref())
    );
    println!();
}

/// Print captured records, newest first
pub fn print_records(records: &[LogRecord]) {
    if records.is_empty() {
        println!("{}", "No logs available".yellow());
        return;
    }

    println!("\n{}", "Logs".bold().underline());
    println!();

    for record in records {
        let stamp = record
            .server_timestamp
            .as_deref()
            .unwrap_or(record.timestamp.as_str());
        println!(
            "{} {} {}",
            format!("[{}]", stamp).dimmed(),
            format_level_colored(&record.level),
            record.message
        );
        if !record.url.is_empty() {
            println!("    {}", record.url.dimmed());
        }
        if let Some(stack) = &record.stack_trace {
            for line in stack.lines() {
                println!("    {}", line.bright_black());
            }
        }
    }

    println!();
}

/// Print the capture log file and engine settings
pub fn print_log_file_info(
    info: &LogFileInfo,
    state: CaptureState,
    max_file_size: u64,
    output_token: Option<&str>,
) {
    println!("\n{}", "Capture Log".bold().underline());
    println!();
    println!("  {:<15} {}", "Path:".bold(), info.path.display());
    println!("  {:<15} {}", "State:".bold(), format_state_colored(state));
    println!("  {:<15} {}", "Exists:".bold(), format_flag(info.exists));
    println!("  {:<15} {}", "Size:".bold(), format_size(info.size_bytes));
    println!("  {:<15} {}", "Rotate at:".bold(), format_size(max_file_size));
    println!(
        "  {:<15} {}",
        "Modified:".bold(),
        format_time(info.last_modified_at.as_ref())
    );
    if let Some(token) = output_token {
        println!("  {:<15} {}", "Token:".bold(), token.cyan());
    }
    println!();
}

/// Print size and line counts of the three log files
pub fn print_stats(stats: &MergedStats) {
    #[derive(Tabled)]
    struct StatsRow {
        #[tabled(rename = "Log")]
        name: &'static str,
        #[tabled(rename = "Exists")]
        exists: String,
        #[tabled(rename = "Size (KB)")]
        size_kb: String,
        #[tabled(rename = "Lines")]
        lines: String,
    }

    let row = |name: &'static str, s: &FileStats| StatsRow {
        name,
        exists: format_flag(s.exists),
        size_kb: format!("{:.2}", s.size_kb),
        lines: s.line_count.to_string(),
    };

    print_table(Table::new(vec![
        row("internal", &stats.internal_log),
        row("external", &stats.external_log),
        row("merged", &stats.merged_log),
    ]));
}

/// Print the outcome of each clear step
pub fn print_clear_result(result: &ClearResult) {
    let line = |name: &str, cleared: bool| {
        if cleared {
            println!("{} {} log cleared", "✓".green().bold(), name);
        } else {
            println!("{} {} log untouched", "-".dimmed(), name);
        }
    };

    line("Internal", result.internal_cleared);
    line("External", result.external_cleared);
    line("Merged", result.merged_cleared);
}

/// Print the effective settings and where they are saved
pub fn print_settings(config: &DevpipeConfig, config_path: &Path) {
    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "Setting")]
        key: String,
        #[tabled(rename = "Value")]
        value: String,
    }

    let mut rows: Vec<SettingRow> = ConfigKey::ALL
        .iter()
        .map(|key| SettingRow {
            key: key.to_string(),
            value: match config.get_value(*key) {
                v if v.is_empty() => "-".dimmed().to_string(),
                v => v,
            },
        })
        .collect();
    rows.push(SettingRow {
        key: "log_dir".to_string(),
        value: config.log_dir.display().to_string(),
    });
    rows.push(SettingRow {
        key: "url_filters".to_string(),
        value: if config.url_filters.is_empty() {
            "-".dimmed().to_string()
        } else {
            config.url_filters.join(", ")
        },
    });

    println!("\n{} {}", "Settings from".bold(), config_path.display());
    print_table(Table::new(rows));
}

/// Print files currently being tailed
pub fn print_watched_files(files: &[WatchedFileInfo]) {
    for file in files {
        println!(
            "  {} {} ({})",
            "→".cyan(),
            file.path.display(),
            format_size(file.size)
        );
    }
}

/// Print a summary of an ingestion run
pub fn print_ingest_summary(accepted: usize, filtered: usize, rejected: usize, log_file: &Path) {
    print_success_msg(&format!(
        "Captured {} record(s) into {}",
        accepted,
        log_file.display()
    ));
    if filtered > 0 {
        print_info(&format!("{} record(s) filtered out", filtered));
    }
    if rejected > 0 {
        print_warning(&format!("{} line(s) rejected", rejected));
    }
}

fn print_table(mut table: Table) {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
}

/// Format a log level with color coding
fn format_level_colored(level: &str) -> String {
    let label = format!("{:<8}", level.to_uppercase());
    match level.to_ascii_lowercase().as_str() {
        "error" | "fatal" => label.red().bold().to_string(),
        "warn" | "warning" => label.yellow().to_string(),
        "info" => label.green().to_string(),
        "debug" | "trace" => label.bright_black().to_string(),
        _ => label.cyan().to_string(),
    }
}

/// Format the capture state with color coding
fn format_state_colored(state: CaptureState) -> String {
    match state {
        CaptureState::Active => state.to_string().green().to_string(),
        CaptureState::Stopped => state.to_string().bright_black().to_string(),
    }
}

fn format_flag(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

fn format_time(time: Option<&DateTime<Local>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format a byte count in human-readable format
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}

/// Truncate a string to a maximum number of characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
