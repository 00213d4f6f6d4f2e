//! Core protocol types for driving a suspending logic-engine toplevel.
//!
//! This crate provides the fundamental building blocks:
//! - `Suspension` / `Outcome` - The resumable query protocol
//! - `ContinuationRegistry` - The single live suspension slot
//! - `AbortLatch` - Deferred abort requests
//! - `Scheduler` - Deferred resume tasks and host completions
//! - `OutputSink` - Answer buffers + broadcast of shell events
//! - `HistoryLog` - Bounded query history with recall cursor
//! - `FileSet` - Named program buffers
//! - Engine and storage traits

pub mod abort;
pub mod config;
pub mod event;
pub mod files;
pub mod history;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod suspension;
pub mod trace;
pub mod traits;
pub mod transcript;

pub use abort::AbortLatch;
pub use config::{CallOptions, ShellConfig};
pub use event::{Channel, Fragment, Mode, Sgr, ShellEvent, Target};
pub use files::{FileNameError, FileSet, FileSetError};
pub use history::HistoryLog;
pub use registry::{ContinuationRegistry, ProtocolError};
pub use scheduler::{Completion, CompletionStatus, Scheduler, Task};
pub use sink::{OutputCallback, OutputSink};
pub use suspension::{AbortHandle, HostCall, Outcome, Payload, Suspension, SuspensionKind};
pub use trace::{TraceAction, TraceEvent};
pub use traits::{Engine, ShellStorage, StorageError};
pub use transcript::{AnswerBuffer, QueryId, QueryRecord, Transcript};
