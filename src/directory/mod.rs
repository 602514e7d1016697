// Directory module - token-addressed output directories

mod manager;
mod store;

pub use manager::{DirectoryInfo, DirectoryManager, DirectoryToken};
pub use store::{TokenMap, TokenStore};
