//! Operator input routing.
//!
//! Front-ends translate their native events into [`OperatorAction`]s; the
//! dispatcher keeps the command line being edited and decides, from the
//! session mode, what each key means.

use serde::{Deserialize, Serialize};
use tracing::debug;

use toplevel_core::{Engine, Mode, TraceAction};

use crate::controller::{MoreAction, SessionController, SessionError};

/// Terminal-independent key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Tab,
    Up,
    Down,
    Esc,
}

/// Operator stimulus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorAction {
    /// A key press.
    Key { key: Key },
    /// Submit a complete line (replaces the line being edited).
    Submit { text: String },
    /// More-answers control.
    More { reply: MoreAction },
    /// Debugger control.
    Trace { trace: TraceAction },
    /// The abort control.
    Abort,
}

/// Whether an action had an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Ignored,
}

/// Debugger key bindings.
#[must_use]
pub const fn trace_shortcut(key: Key) -> Option<TraceAction> {
    let Key::Char(c) = key else {
        return match key {
            Key::Enter => Some(TraceAction::Creep),
            _ => None,
        };
    };
    match c {
        ' ' | 'c' => Some(TraceAction::Creep),
        'a' => Some(TraceAction::Abort),
        'g' => Some(TraceAction::Goals),
        'l' => Some(TraceAction::Leap),
        'L' => Some(TraceAction::Listing),
        'r' => Some(TraceAction::Retry),
        's' => Some(TraceAction::Skip),
        'n' => Some(TraceAction::Nodebug),
        'u' => Some(TraceAction::Up),
        '?' => Some(TraceAction::Help),
        _ => None,
    }
}

/// More-answers key bindings.
#[must_use]
pub const fn more_shortcut(key: Key) -> Option<MoreAction> {
    match key {
        Key::Char(';' | ' ' | 'n' | 'r') | Key::Tab => Some(MoreAction::Redo),
        Key::Char('.' | 'c' | 'a') | Key::Enter => Some(MoreAction::Continue),
        _ => None,
    }
}

/// Mode-aware router from operator actions to session stimuli.
#[derive(Debug, Default)]
pub struct InputDispatcher {
    line: String,
}

impl InputDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The command line being edited.
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Replace the command line.
    pub fn set_line(&mut self, line: impl Into<String>) {
        self.line = line.into();
    }

    /// Route one action.
    ///
    /// # Errors
    /// Returns error if the session rejects the resulting stimulus.
    pub fn dispatch<E: Engine>(
        &mut self,
        action: OperatorAction,
        session: &mut SessionController<E>,
    ) -> Result<Dispatch, SessionError> {
        match action {
            OperatorAction::Abort => {
                let disposition = session.abort();
                debug!(?disposition, "abort control");
                Ok(Dispatch::Handled)
            }
            OperatorAction::Submit { text } => {
                self.line = text;
                self.submit(session)
            }
            OperatorAction::More { reply } if session.mode() == Mode::AwaitingMore => {
                session.reply_more(reply)?;
                Ok(Dispatch::Handled)
            }
            OperatorAction::Trace { trace } if session.mode() == Mode::Tracing => {
                session.reply_trace(trace)?;
                Ok(Dispatch::Handled)
            }
            OperatorAction::More { .. } | OperatorAction::Trace { .. } => Ok(Dispatch::Ignored),
            OperatorAction::Key { key } => self.key(key, session),
        }
    }

    fn key<E: Engine>(
        &mut self,
        key: Key,
        session: &mut SessionController<E>,
    ) -> Result<Dispatch, SessionError> {
        match session.mode() {
            Mode::AwaitingMore => match more_shortcut(key) {
                Some(reply) => {
                    session.reply_more(reply)?;
                    Ok(Dispatch::Handled)
                }
                None => Ok(Dispatch::Ignored),
            },
            Mode::Tracing => match trace_shortcut(key) {
                Some(action) => {
                    session.reply_trace(action)?;
                    Ok(Dispatch::Handled)
                }
                None => Ok(Dispatch::Ignored),
            },
            _ => self.edit(key, session),
        }
    }

    /// Line editing; the line can be typed ahead while a query runs.
    fn edit<E: Engine>(
        &mut self,
        key: Key,
        session: &mut SessionController<E>,
    ) -> Result<Dispatch, SessionError> {
        match key {
            Key::Char(c) => self.line.push(c),
            Key::Backspace => {
                self.line.pop();
            }
            Key::Up => {
                if let Some(text) = session.history_mut().up(&self.line) {
                    self.line = text;
                }
            }
            Key::Down => {
                if let Some(text) = session.history_mut().down() {
                    self.line = text;
                }
            }
            Key::Esc => self.line.clear(),
            Key::Enter if session.mode() == Mode::AwaitingCommand => {
                return self.submit(session);
            }
            Key::Enter | Key::Tab => return Ok(Dispatch::Ignored),
        }
        Ok(Dispatch::Handled)
    }

    fn submit<E: Engine>(
        &mut self,
        session: &mut SessionController<E>,
    ) -> Result<Dispatch, SessionError> {
        if self.line.trim().is_empty() {
            self.line.clear();
            return Ok(Dispatch::Ignored);
        }
        let text = std::mem::take(&mut self.line);
        session.submit(&text)?;
        Ok(Dispatch::Handled)
    }
}
