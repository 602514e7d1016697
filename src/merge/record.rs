use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Which stream a merged record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Internal,
    External,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad() so width/alignment flags apply
        match self {
            SourceType::Internal => f.pad("INTERNAL"),
            SourceType::External => f.pad("EXTERNAL"),
        }
    }
}

/// One line of the merged view. Regenerated on every merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedLogRecord {
    pub source_type: SourceType,
    /// Timestamp as shown in the merged file
    pub timestamp: String,
    pub parsed_timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// Size and line count of one log file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileStats {
    pub exists: bool,
    /// Rounded to two decimals
    pub size_kb: f64,
    pub line_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedStats {
    pub internal_log: FileStats,
    pub external_log: FileStats,
    pub merged_log: FileStats,
}

/// Outcome of each independent clear operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearResult {
    pub internal_cleared: bool,
    pub external_cleared: bool,
    pub merged_cleared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_padding() {
        assert_eq!(format!("[{:>8}]", SourceType::Internal), "[INTERNAL]");
        assert_eq!(format!("[{:>10}]", SourceType::External), "[  EXTERNAL]");
        assert_eq!(SourceType::External.to_string(), "EXTERNAL");
    }

    #[test]
    fn test_clear_result_serializes() {
        let json = serde_json::to_string(&ClearResult {
            internal_cleared: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"internal_cleared":true,"external_cleared":false,"merged_cleared":false}"#
        );
    }
}
