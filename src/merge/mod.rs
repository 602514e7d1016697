// Merge module - combined view of the capture log and an external log

mod manager;
mod record;
mod timestamp;

pub use manager::{MergeManager, MERGED_FILE_NAME};
pub use record::{ClearResult, FileStats, MergedLogRecord, MergedStats, SourceType};
pub use timestamp::{parse_timestamp, ParsedTimestamp};
