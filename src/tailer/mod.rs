// Tailer module - incremental reading of externally written files

mod ingest;
mod registry;
mod watcher;

pub use ingest::{external_record, ingest_callback, EXTERNAL_LEVEL, TAILER_USER_AGENT};
pub use registry::{ChangeCallback, WatchedFileInfo, WatchedFileState};
pub use watcher::FileTailer;
