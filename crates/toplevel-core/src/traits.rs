//! Collaborator traits: the embedded engine and key/value persistence.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    config::CallOptions,
    sink::OutputCallback,
    suspension::Outcome,
    trace::{TraceAction, TraceEvent},
};

/// The embedded logic engine, seen from the session.
///
/// The engine runs synchronously once entered and returns at the next
/// suspension point or with a failure. It must never be entered while a
/// call is outstanding.
pub trait Engine: Send {
    /// Register the callback that receives styled output.
    fn on_output(&mut self, callback: OutputCallback);

    /// Start (or restart) a goal.
    fn call(&mut self, goal: &str, options: CallOptions) -> Outcome;

    /// Synchronous debugger side channel; does not change protocol state.
    fn trace_action(&mut self, action: TraceAction, event: &TraceEvent) -> bool;

    /// Deliver all buffered output to the output callback.
    fn flush_output(&mut self);

    /// Make a program text available under `path`, e.g. before consulting.
    fn store_file(&mut self, path: &str, text: &str) {
        let _ = (path, text);
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Internal(String),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generic key/value persistence for history and files.
#[async_trait]
pub trait ShellStorage: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
