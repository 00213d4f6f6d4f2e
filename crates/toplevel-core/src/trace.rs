//! Debugger (tracer) events and actions.

use serde::{Deserialize, Serialize};

/// Trace event carried by a `debug-step` suspension.
///
/// The session never interprets it; it is handed back to the engine
/// through `Engine::trace_action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Port name (`call`, `exit`, `redo`, `fail`, ...).
    pub port: String,
    /// Frame depth.
    pub depth: u32,
    /// The goal, rendered by the engine.
    pub goal: String,
}

impl TraceEvent {
    /// Create a trace event.
    #[must_use]
    pub fn new(port: impl Into<String>, depth: u32, goal: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            depth,
            goal: goal.into(),
        }
    }
}

/// Debugger command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    /// Render the current event (sent by the session, never by the operator).
    Print,
    Creep,
    Abort,
    Goals,
    Leap,
    Listing,
    Retry,
    Skip,
    Nodebug,
    Up,
    Help,
}

impl TraceAction {
    /// Command name passed to the engine.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Creep => "creep",
            Self::Abort => "abort",
            Self::Goals => "goals",
            Self::Leap => "leap",
            Self::Listing => "listing",
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Nodebug => "nodebug",
            Self::Up => "up",
            Self::Help => "help",
        }
    }

    /// Parse a command name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "print" => Self::Print,
            "creep" => Self::Creep,
            "abort" => Self::Abort,
            "goals" => Self::Goals,
            "leap" => Self::Leap,
            "listing" => Self::Listing,
            "retry" => Self::Retry,
            "skip" => Self::Skip,
            "nodebug" => Self::Nodebug,
            "up" => Self::Up,
            "help" => Self::Help,
            _ => return None,
        })
    }

    /// Actions answered through the side channel without resuming.
    #[must_use]
    pub const fn is_side_channel(self) -> bool {
        matches!(self, Self::Print | Self::Goals | Self::Listing | Self::Help)
    }
}

impl std::fmt::Display for TraceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip_covers_all_actions() {
        let all = [
            TraceAction::Print,
            TraceAction::Creep,
            TraceAction::Abort,
            TraceAction::Goals,
            TraceAction::Leap,
            TraceAction::Listing,
            TraceAction::Retry,
            TraceAction::Skip,
            TraceAction::Nodebug,
            TraceAction::Up,
            TraceAction::Help,
        ];
        for action in all {
            assert_eq!(TraceAction::from_name(action.as_str()), Some(action));
        }
        assert_eq!(TraceAction::from_name("jump"), None);
    }

    #[test]
    fn test_side_channel_actions() {
        assert!(TraceAction::Goals.is_side_channel());
        assert!(TraceAction::Listing.is_side_channel());
        assert!(TraceAction::Help.is_side_channel());
        assert!(!TraceAction::Creep.is_side_channel());
        assert!(!TraceAction::Abort.is_side_channel());
    }
}
