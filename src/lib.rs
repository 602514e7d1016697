// Library exports for devpipe

pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod logs;
pub mod merge;
pub mod tailer;

pub use error::{DevpipeError, ErrorKind, Result};
