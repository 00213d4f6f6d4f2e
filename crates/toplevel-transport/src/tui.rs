//! TUI transport bridge for ratatui applications.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use tokio::sync::mpsc;

use toplevel_core::{Channel, Engine, Fragment, Mode, ShellEvent};
use toplevel_session::Key;

use crate::{
    handler::{ShellHandler, TransportError, run_shell},
    protocol::{ClientMessage, ServerMessage},
};

/// TUI bridge for connecting terminal UI to session.
pub struct TuiBridge {
    /// Sender for client messages.
    pub client_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Receiver for server messages.
    pub server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TuiBridge {
    /// Create a new TUI bridge.
    ///
    /// Returns the bridge and a channel pair for the session side.
    #[must_use]
    pub fn new() -> (Self, TuiSession) {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let bridge = Self {
            client_tx,
            server_rx,
        };

        let session = TuiSession {
            client_rx,
            server_tx,
        };

        (bridge, session)
    }

    /// Send a message to the session.
    ///
    /// # Errors
    /// Returns error if channel is closed.
    pub fn send(&self, msg: ClientMessage) -> Result<(), SendError> {
        self.client_tx
            .send(msg)
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Convert a crossterm key event to a client message.
    ///
    /// Ctrl-C is the abort control; other control chords are not mapped.
    #[must_use]
    pub fn key_to_message(key: &KeyEvent) -> Option<ClientMessage> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let key = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Some(ClientMessage::Abort);
            }
            KeyCode::Char(_)
                if key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                return None;
            }
            KeyCode::Char(c) => Key::Char(c),
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Tab => Key::Tab,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Esc => Key::Esc,
            _ => return None,
        };
        Some(ClientMessage::Key { key })
    }

    /// Handle a crossterm event.
    ///
    /// Returns true if the event was handled.
    pub fn handle_event(&self, event: &Event) -> bool {
        if let Event::Key(key) = event {
            if let Some(msg) = Self::key_to_message(key) {
                return self.send(msg).is_ok();
            }
        }
        false
    }

    /// Receive a server message (non-blocking).
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.server_rx.try_recv().ok()
    }
}

/// Session side of the TUI bridge.
pub struct TuiSession {
    /// Receiver for client messages.
    pub client_rx: mpsc::UnboundedReceiver<ClientMessage>,
    /// Sender for server messages.
    pub server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl TuiSession {
    /// Run a shell until the bridge is dropped, then return its handler.
    ///
    /// # Errors
    /// Returns error if the toplevel cannot be started.
    pub async fn serve<E: Engine>(
        self,
        handler: ShellHandler<E>,
    ) -> Result<ShellHandler<E>, TransportError> {
        run_shell(handler, self.client_rx, self.server_tx).await
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Parse a `#rgb` or `#rrggbb` color.
fn parse_color(value: &str) -> Option<Color> {
    let hex = value.strip_prefix('#').filter(|h| h.is_ascii())?;
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut it = hex.chars().map(|c| channel(&c.to_string()).map(|v| v * 17));
            Some(Color::Rgb(it.next()??, it.next()??, it.next()??))
        }
        6 => Some(Color::Rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        _ => None,
    }
}

fn style_for(fragment: &Fragment) -> Style {
    let mut style = match fragment.channel {
        Channel::Stdout => Style::default(),
        Channel::Stderr => Style::default().fg(Color::Red),
    };
    if let Some(sgr) = &fragment.sgr {
        if let Some(color) = sgr.color.as_deref().and_then(parse_color) {
            style = style.fg(color);
        }
        if let Some(color) = sgr.background_color.as_deref().and_then(parse_color) {
            style = style.bg(color);
        }
        if sgr.bold {
            style = style.add_modifier(Modifier::BOLD);
        }
        if sgr.underline {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
    }
    style
}

/// Local view of a session, built from server messages.
#[derive(Debug, Default)]
pub struct TuiState {
    lines: Vec<Vec<Fragment>>,
    mode: Option<Mode>,
    input: String,
    session_id: Option<String>,
    last_error: Option<String>,
}

impl TuiState {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one server message.
    pub fn apply(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::SessionStarted { session_id } => self.session_id = Some(session_id),
            ServerMessage::InputLine { text } => self.input = text,
            ServerMessage::Error { message } => self.last_error = Some(message),
            ServerMessage::Pong => {}
            ServerMessage::Event { event } => self.apply_event(event),
        }
    }

    fn apply_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Output { fragment, .. } => self.append(fragment),
            ShellEvent::QueryStarted { text, .. } => {
                self.lines.push(vec![Fragment::stdout(format!("?- {text}"))]);
                self.lines.push(Vec::new());
            }
            ShellEvent::AnswerStarted { answer, .. } if answer > 0 => self.lines.push(Vec::new()),
            ShellEvent::ModeChanged { mode } => {
                self.mode = Some(mode);
                self.last_error = None;
            }
            ShellEvent::AnswerStarted { .. }
            | ShellEvent::QueryCollapsed { .. }
            | ShellEvent::QueryClosed { .. } => {}
        }
    }

    /// Append output, splitting it into lines.
    fn append(&mut self, fragment: Fragment) {
        let mut parts = fragment.text.split('\n');
        if let Some(first) = parts.next() {
            if self.lines.is_empty() {
                self.lines.push(Vec::new());
            }
            if !first.is_empty() {
                if let Some(line) = self.lines.last_mut() {
                    line.push(Fragment::new(first, fragment.channel, fragment.sgr.clone()));
                }
            }
        }
        for part in parts {
            self.lines.push(vec![Fragment::new(
                part,
                fragment.channel,
                fragment.sgr.clone(),
            )]);
        }
    }

    /// The output, styled for rendering.
    #[must_use]
    pub fn output_lines(&self) -> Vec<Line<'static>> {
        self.lines
            .iter()
            .map(|line| {
                Line::from(
                    line.iter()
                        .map(|f| Span::styled(f.text.clone(), style_for(f)))
                        .collect::<Vec<_>>(),
                )
            })
            .collect()
    }

    /// Number of output lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Current mode, once known.
    #[must_use]
    pub const fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// The command line.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last error reported by the session.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
