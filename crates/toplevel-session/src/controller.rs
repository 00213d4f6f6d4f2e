//! Session state machine.
//!
//! The controller owns the engine and sequences every entry into it: it
//! starts the toplevel, registers each suspension it returns, routes the
//! operator's stimuli to the right resumption and restarts the toplevel
//! after failures. Everything runs on one thread of control; deferred work
//! (cooperative yields, host completions) goes through the [`Scheduler`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use toplevel_core::{
    AbortHandle, AbortLatch, CallOptions, CompletionStatus, ContinuationRegistry, Engine, Fragment,
    HistoryLog, Mode, Outcome, OutputSink, Payload, ProtocolError, Scheduler, Sgr, ShellConfig,
    StorageError, Suspension, SuspensionKind, Task, TraceAction,
};

/// Color of the tracer's echoed action marker.
pub const TRACE_MARKER_COLOR: &str = "#888";

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Expected mode {expected:?}, session is {actual:?}")]
    WrongMode { expected: Mode, actual: Mode },
}

/// Operator reply at a more-answers prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoreAction {
    /// Ask for the next solution.
    Redo,
    /// Stop enumerating solutions.
    Continue,
}

impl MoreAction {
    /// Command sent to the engine.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redo => "redo",
            Self::Continue => "continue",
        }
    }

    /// Marker echoed after the answer.
    const fn marker(self) -> &'static str {
        match self {
            Self::Redo => ";",
            Self::Continue => ".",
        }
    }
}

/// What an abort request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortDisposition {
    /// The pending call was signalled directly.
    Signalled,
    /// The abort will be injected at the next resumption.
    Latched,
    /// An abort was already latched.
    AlreadyLatched,
}

/// Append a clause terminator if the query has none.
#[must_use]
pub fn terminate_clause(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.ends_with('.') {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

/// Call a goal that must not affect the protocol state.
fn side_call<E: Engine>(engine: &mut E, goal: &str, options: CallOptions) {
    match engine.call(goal, options) {
        Outcome::Suspended(suspension) => {
            warn!(goal, kind = ?suspension.kind(), "side call suspended; dropping it");
        }
        Outcome::Failed { reason, .. } if !reason.is_empty() => {
            debug!(goal, %reason, "side call failed");
        }
        Outcome::Failed { .. } => {}
    }
}

/// A call taken over by host code.
struct Delegated {
    abort: Option<AbortHandle>,
    status: CompletionStatus,
}

impl Delegated {
    /// Abort handle, while the host has not posted its outcome yet.
    fn live_abort(&self) -> Option<&AbortHandle> {
        if self.status.is_posted() {
            None
        } else {
            self.abort.as_ref()
        }
    }
}

/// Drives one engine toplevel on behalf of one operator.
pub struct SessionController<E: Engine> {
    engine: E,
    config: ShellConfig,
    sink: Arc<OutputSink>,
    registry: ContinuationRegistry,
    latch: AbortLatch,
    scheduler: Scheduler,
    history: HistoryLog,
    mode: Mode,
    /// Call taken over by host code.
    delegated: Option<Delegated>,
}

impl<E: Engine> SessionController<E> {
    /// Create a controller and route the engine's output into `sink`.
    pub fn new(mut engine: E, config: ShellConfig, sink: Arc<OutputSink>) -> Self {
        engine.on_output(sink.callback());
        let history = HistoryLog::with_limit(config.history_limit);
        Self {
            engine,
            config,
            sink,
            registry: ContinuationRegistry::new(),
            latch: AbortLatch::new(),
            scheduler: Scheduler::new(),
            history,
            mode: Mode::Idle,
            delegated: None,
        }
    }

    /// Enter the toplevel loop.
    ///
    /// # Errors
    /// Returns error if the session was already started.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require(Mode::Idle)?;
        info!(goal = %self.config.toplevel_goal, "starting toplevel");
        let outcome = self.enter_toplevel();
        self.advance(outcome)
    }

    /// Submit a line typed at the goal prompt.
    ///
    /// The line is terminated with `.` if needed and recorded in history,
    /// even when a latched abort preempts it.
    ///
    /// # Errors
    /// Returns error if the session is not at the goal prompt.
    pub fn submit(&mut self, text: &str) -> Result<(), SessionError> {
        self.require(Mode::AwaitingCommand)?;
        let query = terminate_clause(text);
        self.history.push(query.clone());
        self.run_query(&query)
    }

    /// Run a query without recording it in history.
    ///
    /// # Errors
    /// Returns error if the session is not at the goal prompt.
    pub fn run_query(&mut self, text: &str) -> Result<(), SessionError> {
        self.require(Mode::AwaitingCommand)?;
        if self.deliver_latched_abort()? {
            return Ok(());
        }
        let query = terminate_clause(text);
        let id = self.sink.start_query(&query);
        debug!(query = %query, id, "running query");
        self.resume_with(&query)
    }

    /// Answer a more-answers prompt.
    ///
    /// # Errors
    /// Returns error if no more-answers prompt is pending.
    pub fn reply_more(&mut self, action: MoreAction) -> Result<(), SessionError> {
        self.require(Mode::AwaitingMore)?;
        if self.deliver_latched_abort()? {
            return Ok(());
        }
        self.sink.push_stdout(action.marker());
        match action {
            MoreAction::Redo => self.sink.next_answer(),
            MoreAction::Continue => self.sink.suppress_next_blank(),
        }
        self.resume_with(action.as_str())
    }

    /// Answer a debugger prompt.
    ///
    /// The action is echoed as a marker on stderr. Side-channel actions
    /// (goals, listing, help) are answered in place and the tracer keeps
    /// waiting; all others resume the suspended step.
    ///
    /// # Errors
    /// Returns error if no debugger prompt is pending.
    pub fn reply_trace(&mut self, action: TraceAction) -> Result<(), SessionError> {
        self.require(Mode::Tracing)?;
        if self.deliver_latched_abort()? {
            return Ok(());
        }
        self.sink.push(
            Fragment::stderr(format!(" [{action}]")).with_sgr(Sgr::color(TRACE_MARKER_COLOR)),
        );
        side_call(
            &mut self.engine,
            &self.config.trace_newline_goal,
            CallOptions::nodebug(),
        );

        if action.is_side_channel() {
            let Some(Payload::DebugStep(event)) = self.registry.current().map(Suspension::payload)
            else {
                return Err(ProtocolError::NoSuspension.into());
            };
            let event = event.clone();
            if !self.engine.trace_action(action, &event) {
                debug!(%action, "trace side channel declined");
            }
            self.engine.flush_output();
            return Ok(());
        }
        self.resume_with(action.as_str())
    }

    /// Request an abort.
    ///
    /// A pending call with an abort handle is signalled at once; otherwise
    /// the request is latched until the next resumption. A host call that
    /// already posted its outcome can no longer be signalled, so the abort
    /// is latched and injected once that outcome is registered.
    pub fn abort(&mut self) -> AbortDisposition {
        if let Some(handle) = self
            .registry
            .abort_handle()
            .or_else(|| self.delegated.as_ref().and_then(Delegated::live_abort))
        {
            info!(mode = ?self.mode, "signalling abort");
            handle.abort();
            return AbortDisposition::Signalled;
        }
        if self.latch.request() {
            info!(mode = ?self.mode, "abort latched");
            AbortDisposition::Latched
        } else {
            AbortDisposition::AlreadyLatched
        }
    }

    /// Run one queued task, if any.
    ///
    /// Returns whether a task ran. Drivers call this between operator
    /// events so that aborts are processed while long queries yield.
    ///
    /// # Errors
    /// Returns error if the task violates the suspension protocol.
    pub fn tick(&mut self) -> Result<bool, SessionError> {
        let Some(task) = self.scheduler.try_next() else {
            return Ok(false);
        };
        self.run_task(task)?;
        Ok(true)
    }

    /// Wait for the next queued task.
    pub async fn next_task(&mut self) -> Option<Task> {
        self.scheduler.next().await
    }

    /// Queue a task behind the pending ones.
    pub fn post(&self, task: Task) {
        self.scheduler.submit(task);
    }

    /// Run a task obtained from [`next_task`](Self::next_task).
    ///
    /// # Errors
    /// Returns error if the task violates the suspension protocol.
    pub fn run_task(&mut self, task: Task) -> Result<(), SessionError> {
        match task {
            Task::Resume { command } => {
                if !self.deliver_latched_abort()? {
                    self.resume_with(&command)?;
                }
            }
            Task::Deliver(outcome) => {
                debug!(kind = ?outcome.kind(), "host call completed");
                self.delegated = None;
                self.set_mode(Mode::Running);
                self.advance(outcome)?;
            }
        }
        Ok(())
    }

    /// Run queued tasks until the queue is empty.
    ///
    /// A query that keeps yielding keeps the queue busy; interactive drivers
    /// should use [`tick`](Self::tick) instead.
    ///
    /// # Errors
    /// Returns error if a task violates the suspension protocol.
    pub fn drain(&mut self) -> Result<usize, SessionError> {
        let mut ran = 0;
        while self.tick()? {
            ran += 1;
        }
        Ok(ran)
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Kind of the registered suspension.
    #[must_use]
    pub fn pending(&self) -> Option<SuspensionKind> {
        self.registry.kind()
    }

    /// Whether an abort waits for the next resumption.
    #[must_use]
    pub const fn abort_latched(&self) -> bool {
        self.latch.is_set()
    }

    /// Query history.
    #[must_use]
    pub const fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Query history, for navigation.
    pub const fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }

    /// Replace the history, e.g. after restoring it from storage.
    pub fn set_history(&mut self, history: HistoryLog) {
        self.history = history;
    }

    /// Output sink shared with front-ends.
    #[must_use]
    pub fn sink(&self) -> &Arc<OutputSink> {
        &self.sink
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// The engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// The engine, for calls outside the protocol (e.g. storing files).
    pub const fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn require(&self, expected: Mode) -> Result<(), SessionError> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(SessionError::WrongMode {
                expected,
                actual: self.mode,
            })
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            debug!(from = ?self.mode, to = ?mode, "mode change");
            self.mode = mode;
            self.sink.mode_changed(mode);
        }
    }

    fn enter_toplevel(&mut self) -> Outcome {
        self.set_mode(Mode::Running);
        self.engine
            .call(&self.config.toplevel_goal, self.config.toplevel_options)
    }

    /// Resume the registered suspension with the latched abort, if any.
    fn deliver_latched_abort(&mut self) -> Result<bool, SessionError> {
        if !self.latch.take() {
            return Ok(false);
        }
        info!(kind = ?self.registry.kind(), "delivering latched abort");
        let outcome = self.registry.take_and_resume(&self.config.abort_command)?;
        self.set_mode(Mode::Running);
        self.advance(outcome)?;
        Ok(true)
    }

    fn resume_with(&mut self, command: &str) -> Result<(), SessionError> {
        let outcome = self.registry.take_and_resume(command)?;
        self.set_mode(Mode::Running);
        self.advance(outcome)
    }

    /// Process engine outcomes until the session waits for a stimulus.
    fn advance(&mut self, mut outcome: Outcome) -> Result<(), SessionError> {
        loop {
            let suspension = match outcome {
                Outcome::Suspended(suspension) => suspension,
                Outcome::Failed { reason, is_abort } => {
                    self.engine.flush_output();
                    if is_abort {
                        info!("execution aborted; restarting toplevel");
                        side_call(
                            &mut self.engine,
                            &self.config.abort_notice_goal,
                            CallOptions::default(),
                        );
                    } else if reason.is_empty() {
                        debug!("toplevel returned; restarting");
                    } else {
                        warn!(%reason, "toplevel failed; restarting");
                    }
                    outcome = self.enter_toplevel();
                    continue;
                }
            };

            let kind = suspension.kind();
            self.registry.register(suspension)?;
            self.engine.flush_output();

            if self.latch.take() {
                info!(?kind, "delivering latched abort");
                outcome = self.registry.take_and_resume(&self.config.abort_command)?;
                continue;
            }

            match kind {
                SuspensionKind::GoalRequest => {
                    self.sink.detach();
                    self.set_mode(Mode::AwaitingCommand);
                }
                SuspensionKind::MoreAnswers => self.set_mode(Mode::AwaitingMore),
                SuspensionKind::DebugStep => {
                    if let Some(Payload::DebugStep(event)) =
                        self.registry.current().map(Suspension::payload)
                    {
                        let event = event.clone();
                        self.engine.trace_action(TraceAction::Print, &event);
                        self.engine.flush_output();
                    }
                    self.set_mode(Mode::Tracing);
                }
                SuspensionKind::CooperativeYield => {
                    self.scheduler
                        .submit_resume(self.config.yield_command.clone());
                }
                SuspensionKind::HostDelegatedCall => {
                    let (payload, _resume, abort) = self.registry.take()?.into_parts();
                    if let Payload::HostDelegatedCall(call) = payload {
                        let completion = self.scheduler.completion();
                        self.delegated = Some(Delegated {
                            abort,
                            status: completion.status(),
                        });
                        self.set_mode(Mode::HostDelegated);
                        call.invoke(completion);
                    }
                }
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use toplevel_core::{Channel, TraceEvent};

    use super::*;

    /// Engine whose toplevel asks for one goal and echoes it.
    #[derive(Default)]
    struct EchoEngine {
        calls: Arc<Mutex<Vec<String>>>,
        output: Option<toplevel_core::OutputCallback>,
    }

    fn prompt(calls: Arc<Mutex<Vec<String>>>) -> Outcome {
        Suspension::goal_request(move |goal| {
            calls.lock().unwrap().push(goal.to_string());
            prompt(calls)
        })
        .into()
    }

    impl Engine for EchoEngine {
        fn on_output(&mut self, callback: toplevel_core::OutputCallback) {
            self.output = Some(callback);
        }

        fn call(&mut self, goal: &str, _options: CallOptions) -> Outcome {
            if goal == "wasm_query_loop" {
                return prompt(Arc::clone(&self.calls));
            }
            if let Some(out) = &self.output {
                out(goal, Channel::Stderr, None);
            }
            Outcome::completed()
        }

        fn trace_action(&mut self, _action: TraceAction, _event: &TraceEvent) -> bool {
            true
        }

        fn flush_output(&mut self) {}
    }

    fn controller() -> (SessionController<EchoEngine>, Arc<Mutex<Vec<String>>>) {
        let engine = EchoEngine::default();
        let calls = Arc::clone(&engine.calls);
        let sink = Arc::new(OutputSink::new());
        (
            SessionController::new(engine, ShellConfig::default(), sink),
            calls,
        )
    }

    #[test]
    fn test_terminate_clause() {
        assert_eq!(terminate_clause("X = 1"), "X = 1.");
        assert_eq!(terminate_clause("true.  "), "true.");
        assert_eq!(terminate_clause(""), ".");
    }

    #[test]
    fn test_start_reaches_goal_prompt() {
        let (mut c, _) = controller();
        assert_eq!(c.mode(), Mode::Idle);
        c.start().unwrap();
        assert_eq!(c.mode(), Mode::AwaitingCommand);
        assert_eq!(c.pending(), Some(SuspensionKind::GoalRequest));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (mut c, _) = controller();
        c.start().unwrap();
        assert!(matches!(
            c.start(),
            Err(SessionError::WrongMode {
                expected: Mode::Idle,
                ..
            })
        ));
    }

    #[test]
    fn test_submit_terminates_and_records() {
        let (mut c, calls) = controller();
        c.start().unwrap();
        c.submit("X = 1").unwrap();
        assert_eq!(calls.lock().unwrap().as_slice(), ["X = 1."]);
        assert_eq!(c.history().entries().collect::<Vec<_>>(), ["X = 1."]);
        assert_eq!(c.mode(), Mode::AwaitingCommand);
    }

    #[test]
    fn test_reply_more_outside_prompt_is_rejected() {
        let (mut c, _) = controller();
        c.start().unwrap();
        assert!(c.reply_more(MoreAction::Redo).is_err());
        assert!(c.reply_trace(TraceAction::Creep).is_err());
    }

    #[test]
    fn test_abort_at_prompt_is_latched_once() {
        let (mut c, calls) = controller();
        c.start().unwrap();
        assert_eq!(c.abort(), AbortDisposition::Latched);
        assert_eq!(c.abort(), AbortDisposition::AlreadyLatched);
        c.submit("member(X, [a])").unwrap();
        assert_eq!(calls.lock().unwrap().as_slice(), ["wasm_abort"]);
        assert!(!c.abort_latched());
        assert_eq!(c.history().len(), 1);
        assert!(c.sink().snapshot().queries().is_empty());
    }

    #[test]
    fn test_stray_resume_keeps_mode() {
        let (mut c, _) = controller();
        c.post(Task::Resume {
            command: "true".to_string(),
        });
        assert!(matches!(
            c.tick(),
            Err(SessionError::Protocol(ProtocolError::NoSuspension))
        ));
        assert_eq!(c.mode(), Mode::Idle);
    }
}
