//! Output fragments and shell events.

use serde::{Deserialize, Serialize};

use crate::transcript::QueryId;

/// Output channel a fragment was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Normal output.
    Stdout,
    /// Error and tracer output.
    Stderr,
}

impl Channel {
    /// Wire name of the channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Display attributes attached to a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sgr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub underline: bool,
}

impl Sgr {
    /// Attributes with only a foreground color.
    #[must_use]
    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..Self::default()
        }
    }
}

/// A styled piece of text emitted by the engine or the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sgr: Option<Sgr>,
}

impl Fragment {
    /// Create a fragment.
    #[must_use]
    pub fn new(text: impl Into<String>, channel: Channel, sgr: Option<Sgr>) -> Self {
        Self {
            text: text.into(),
            channel,
            sgr,
        }
    }

    /// Plain stdout fragment.
    #[must_use]
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(text, Channel::Stdout, None)
    }

    /// Plain stderr fragment.
    #[must_use]
    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(text, Channel::Stderr, None)
    }

    /// Attach display attributes.
    #[must_use]
    pub fn with_sgr(mut self, sgr: Sgr) -> Self {
        self.sgr = Some(sgr);
        self
    }

    /// Whether the fragment is an empty (whitespace only) line.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Where a fragment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// General output area, outside any query.
    Scrollback,
    /// An answer buffer of a query.
    Answer { query: QueryId, answer: usize },
}

/// UI-visible mode of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Toplevel not started.
    Idle,
    /// Waiting for a query at the goal prompt.
    AwaitingCommand,
    /// Waiting for the operator to ask for more solutions or stop.
    AwaitingMore,
    /// Waiting for a debugger command.
    Tracing,
    /// Engine is executing.
    Running,
    /// Host code is completing a delegated call.
    HostDelegated,
}

impl Mode {
    /// Short label used by front-ends.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingCommand => "prompt goal",
            Self::AwaitingMore => "more",
            Self::Tracing => "trace",
            Self::Running => "run",
            Self::HostDelegated => "host",
        }
    }
}

/// Event broadcast to live front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShellEvent {
    /// A fragment was appended.
    Output { target: Target, fragment: Fragment },
    /// A new query record was created.
    QueryStarted { query: QueryId, text: String },
    /// A new answer buffer was created for a query.
    AnswerStarted { query: QueryId, answer: usize },
    /// A query record was collapsed or expanded.
    QueryCollapsed { query: QueryId, collapsed: bool },
    /// A query record was closed by the operator.
    QueryClosed { query: QueryId },
    /// The session changed mode.
    ModeChanged { mode: Mode },
}
