//! Session orchestration for a suspending logic-engine toplevel.
//!
//! Provides:
//! - `SessionController` - The state machine sequencing engine suspensions
//! - `InputDispatcher` - Operator keys and controls to session stimuli
//! - `Workspace` - Program files, consult and persistence
//! - Storage implementations (memory, filesystem)

pub mod controller;
pub mod dispatcher;
pub mod storage;
pub mod workspace;

pub use controller::{AbortDisposition, MoreAction, SessionController, SessionError};
pub use dispatcher::{Dispatch, InputDispatcher, Key, OperatorAction};
pub use workspace::Workspace;
