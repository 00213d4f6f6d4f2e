//! Output sink: answer buffers plus live broadcast.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    event::{Channel, Fragment, Mode, Sgr, ShellEvent},
    transcript::{QueryId, Transcript},
};

/// Engine output callback: `(line, channel, attributes)`.
pub type OutputCallback = Arc<dyn Fn(&str, Channel, Option<Sgr>) + Send + Sync>;

/// Capacity of the live event channel.
const EVENT_CAPACITY: usize = 10_000;

/// Output sink shared between the engine and the session.
///
/// Every mutation is recorded in the transcript and broadcast to live
/// listeners, so a front-end can render from a snapshot and then follow
/// the stream.
pub struct OutputSink {
    transcript: RwLock<Transcript>,
    sender: broadcast::Sender<ShellEvent>,
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink {
    /// Create a new output sink.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transcript: RwLock::new(Transcript::new()),
            sender,
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Transcript> {
        self.transcript
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Transcript> {
        self.transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ShellEvent) {
        let _ = self.sender.send(event); // no listeners is fine
    }

    /// Append a fragment to the current answer (or scrollback).
    pub fn push(&self, fragment: Fragment) {
        let target = self.write_guard().write(fragment.clone());
        if let Some(target) = target {
            self.emit(ShellEvent::Output { target, fragment });
        }
    }

    /// Engine-facing output entry point.
    pub fn print(&self, line: &str, channel: Channel, sgr: Option<Sgr>) {
        self.push(Fragment::new(line, channel, sgr));
    }

    /// Push stdout text.
    pub fn push_stdout<S: Into<String>>(&self, s: S) {
        self.push(Fragment::stdout(s));
    }

    /// Push stderr text.
    pub fn push_stderr<S: Into<String>>(&self, s: S) {
        self.push(Fragment::stderr(s));
    }

    /// Callback suitable for registering with an engine.
    #[must_use]
    pub fn callback(self: &Arc<Self>) -> OutputCallback {
        let sink = Arc::clone(self);
        Arc::new(move |line: &str, channel: Channel, sgr: Option<Sgr>| {
            sink.print(line, channel, sgr);
        })
    }

    /// Start a new query record.
    pub fn start_query(&self, text: &str) -> QueryId {
        let (id, collapsed) = {
            let mut t = self.write_guard();
            let prev = t.last_query().map(|q| q.id);
            (t.start_query(text), prev)
        };
        if let Some(prev) = collapsed {
            self.emit(ShellEvent::QueryCollapsed {
                query: prev,
                collapsed: true,
            });
        }
        self.emit(ShellEvent::QueryStarted {
            query: id,
            text: text.to_string(),
        });
        self.emit(ShellEvent::AnswerStarted {
            query: id,
            answer: 0,
        });
        id
    }

    /// Open the next answer buffer of the current query.
    pub fn next_answer(&self) {
        let opened = self.write_guard().next_answer();
        if let Some((query, answer)) = opened {
            self.emit(ShellEvent::AnswerStarted { query, answer });
        }
    }

    /// Swallow the next fragment if it is blank.
    pub fn suppress_next_blank(&self) {
        self.write_guard().suppress_next_blank();
    }

    /// Route further output to the scrollback.
    pub fn detach(&self) {
        self.write_guard().detach();
    }

    /// Collapse, expand or toggle (`None`) a query record.
    pub fn set_collapsed(&self, query: QueryId, how: Option<bool>) {
        let result = self.write_guard().set_collapsed(query, how);
        if let Some(collapsed) = result {
            self.emit(ShellEvent::QueryCollapsed { query, collapsed });
        }
    }

    /// Close a query record.
    pub fn close_query(&self, query: QueryId) {
        let removed = self.write_guard().close(query);
        if removed {
            self.emit(ShellEvent::QueryClosed { query });
        }
    }

    /// Announce a mode change.
    pub fn mode_changed(&self, mode: Mode) {
        self.emit(ShellEvent::ModeChanged { mode });
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.sender.subscribe()
    }

    /// Snapshot of the transcript.
    #[must_use]
    pub fn snapshot(&self) -> Transcript {
        self.read_guard().clone()
    }

    /// Run a closure against the transcript without cloning it.
    pub fn with_transcript<R>(&self, f: impl FnOnce(&Transcript) -> R) -> R {
        f(&self.read_guard())
    }

    /// Stream of live events. Lagged receivers skip what they missed.
    #[must_use]
    pub fn event_stream(&self) -> futures::stream::BoxStream<'static, ShellEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("event stream lagged: {e}");
                        None
                    }
                }
            })
            .boxed()
    }
}
