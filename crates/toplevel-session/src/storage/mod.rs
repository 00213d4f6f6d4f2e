//! Storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "fs")]
pub mod fs;

#[cfg(feature = "memory")]
pub use memory::MemoryStorage;

#[cfg(feature = "fs")]
pub use fs::FsStorage;

/// Key of the persisted query history.
pub const HISTORY_KEY: &str = "history";

/// Key of the persisted file list.
pub const FILES_KEY: &str = "files";
