//! Wire protocol for client-server communication.

use serde::{Deserialize, Serialize};

use toplevel_core::{QueryId, ShellEvent, TraceAction};
use toplevel_session::{Key, MoreAction, OperatorAction};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit a complete query line.
    Submit { text: String },
    /// A key pressed in the command line.
    Key { key: Key },
    /// Ask for the next solution.
    Redo,
    /// Stop enumerating solutions.
    Continue,
    /// Debugger command.
    Trace { action: TraceAction },
    /// The abort control.
    Abort,
    /// Store a program text and consult it. Without `file` the current
    /// file is used.
    Consult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        content: String,
    },
    /// Collapse, expand or toggle (no `collapsed`) a query record.
    Collapse {
        query: QueryId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collapsed: Option<bool>,
    },
    /// Remove a query record.
    Close { query: QueryId },
    /// Ping for keepalive.
    Ping,
}

impl ClientMessage {
    /// The operator action this message stands for, if any.
    #[must_use]
    pub fn to_action(&self) -> Option<OperatorAction> {
        match self {
            Self::Submit { text } => Some(OperatorAction::Submit { text: text.clone() }),
            Self::Key { key } => Some(OperatorAction::Key { key: *key }),
            Self::Redo => Some(OperatorAction::More {
                reply: MoreAction::Redo,
            }),
            Self::Continue => Some(OperatorAction::More {
                reply: MoreAction::Continue,
            }),
            Self::Trace { action } => Some(OperatorAction::Trace { trace: *action }),
            Self::Abort => Some(OperatorAction::Abort),
            Self::Consult { .. } | Self::Collapse { .. } | Self::Close { .. } | Self::Ping => None,
        }
    }

    /// Whether the message edits the command line.
    #[must_use]
    pub const fn edits_line(&self) -> bool {
        matches!(self, Self::Submit { .. } | Self::Key { .. })
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session started.
    SessionStarted { session_id: String },
    /// Transcript or mode update.
    Event { event: ShellEvent },
    /// The command line as edited on the server.
    InputLine { text: String },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}
