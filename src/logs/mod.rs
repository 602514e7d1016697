// Logs module - log capture, rotation and reading

mod filter;
mod manager;
mod reader;
mod record;
mod writer;

pub use filter::{AcceptAll, AcceptFilter, UrlFilter};
pub use manager::{CaptureState, LogFileInfo, LogManager, WriteOutcome, LOG_FILE_NAME};
pub use reader::{count_lines, read_last_lines};
pub use record::{LogRecord, Scalar};
pub use writer::{RotatingWriter, DEFAULT_MAX_LOG_SIZE};
