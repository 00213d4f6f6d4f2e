//! Front-end independent session loop.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use toplevel_core::{Engine, FileNameError, OutputSink, ShellConfig, ShellStorage};
use toplevel_session::{InputDispatcher, SessionController, SessionError, Workspace};

use crate::protocol::{ClientMessage, ServerMessage};

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    FileName(#[from] FileNameError),
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether the session broke the suspension protocol and cannot be
    /// driven any further.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(SessionError::Protocol(_)))
    }
}

/// One session plus the operator-side state around it.
pub struct ShellHandler<E: Engine> {
    session: SessionController<E>,
    input: InputDispatcher,
    workspace: Workspace,
}

impl<E: Engine> ShellHandler<E> {
    /// Create a handler with a fresh output sink and workspace.
    pub fn new(engine: E, config: ShellConfig) -> Self {
        let workspace = Workspace::new(&config);
        let session = SessionController::new(engine, config, Arc::new(OutputSink::new()));
        Self {
            session,
            input: InputDispatcher::new(),
            workspace,
        }
    }

    /// Use a restored workspace.
    #[must_use]
    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = workspace;
        self
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &SessionController<E> {
        &self.session
    }

    /// The session, mutably.
    pub const fn session_mut(&mut self) -> &mut SessionController<E> {
        &mut self.session
    }

    /// The program files.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The program files, mutably.
    pub const fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    /// Save the program files and the query history.
    ///
    /// # Errors
    /// Returns error if the storage fails.
    pub async fn persist<S: ShellStorage + ?Sized>(
        &mut self,
        storage: &S,
    ) -> Result<(), TransportError> {
        self.workspace
            .persist(self.session.history(), storage)
            .await?;
        Ok(())
    }

    /// Apply one client message and return the direct replies.
    ///
    /// # Errors
    /// Returns error if the session rejects the message.
    pub fn handle(&mut self, msg: ClientMessage) -> Result<Vec<ServerMessage>, TransportError> {
        if let Some(action) = msg.to_action() {
            self.input.dispatch(action, &mut self.session)?;
            if msg.edits_line() {
                return Ok(vec![ServerMessage::InputLine {
                    text: self.input.line().to_string(),
                }]);
            }
            return Ok(Vec::new());
        }

        match msg {
            ClientMessage::Ping => return Ok(vec![ServerMessage::Pong]),
            ClientMessage::Consult { file, content } => {
                if let Some(file) = file {
                    self.workspace.create(&file)?;
                }
                self.workspace.set_text(content);
                self.workspace.consult(&mut self.session)?;
            }
            ClientMessage::Collapse { query, collapsed } => {
                self.session.sink().set_collapsed(query, collapsed);
            }
            ClientMessage::Close { query } => self.session.sink().close_query(query),
            other => debug!(?other, "message without effect"),
        }
        Ok(Vec::new())
    }
}

/// Drive a session from an inbox of client messages until it closes.
///
/// Client messages take priority over shell events, which take priority
/// over deferred session work, so an abort is seen between two resumes of
/// a yielding query. The handler is handed back once the inbox closes.
///
/// Rejected messages are answered with an error and the loop goes on.
///
/// # Errors
/// Returns error if the toplevel cannot be started or the session breaks
/// the suspension protocol. The client is sent an error message first.
pub async fn run_shell<E: Engine>(
    mut handler: ShellHandler<E>,
    mut inbox: mpsc::UnboundedReceiver<ClientMessage>,
    outbox: mpsc::UnboundedSender<ServerMessage>,
) -> Result<ShellHandler<E>, TransportError> {
    let mut events = handler.session().sink().event_stream();
    handler.session_mut().start()?;
    info!("shell running");

    loop {
        tokio::select! {
            biased;

            msg = inbox.recv() => {
                let Some(msg) = msg else { break };
                let replies = match handler.handle(msg) {
                    Ok(replies) => replies,
                    Err(e) if e.is_fatal() => return Err(abandon(&outbox, e)),
                    Err(e) => {
                        warn!(error = %e, "client message rejected");
                        vec![ServerMessage::Error { message: e.to_string() }]
                    }
                };
                if replies.into_iter().any(|r| outbox.send(r).is_err()) {
                    break;
                }
            }
            Some(event) = events.next() => {
                if outbox.send(ServerMessage::Event { event }).is_err() {
                    break;
                }
            }
            Some(task) = handler.session_mut().next_task() => {
                if let Err(e) = handler.session_mut().run_task(task) {
                    let e = TransportError::from(e);
                    if e.is_fatal() {
                        return Err(abandon(&outbox, e));
                    }
                    warn!(error = %e, "deferred task failed");
                    let _ = outbox.send(ServerMessage::Error { message: e.to_string() });
                }
            }
        }
    }

    info!("shell closed");
    Ok(handler)
}

fn abandon(outbox: &mpsc::UnboundedSender<ServerMessage>, e: TransportError) -> TransportError {
    error!(error = %e, "suspension protocol broken; closing shell");
    let _ = outbox.send(ServerMessage::Error {
        message: e.to_string(),
    });
    e
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use toplevel_core::{
        CallOptions, Completion, Outcome, OutputCallback, ProtocolError, ShellEvent, Suspension,
        Task, TraceAction, TraceEvent, event::Mode,
    };

    use super::*;

    /// Toplevel that accepts every goal silently.
    struct TrueEngine;

    fn prompt() -> Outcome {
        Suspension::goal_request(|_| prompt()).into()
    }

    impl Engine for TrueEngine {
        fn on_output(&mut self, _callback: OutputCallback) {}

        fn call(&mut self, _goal: &str, _options: CallOptions) -> Outcome {
            prompt()
        }

        fn trace_action(&mut self, _action: TraceAction, _event: &TraceEvent) -> bool {
            false
        }

        fn flush_output(&mut self) {}
    }

    /// Toplevel that hands every goal to host code and parks the completion.
    #[derive(Default)]
    struct ParkingEngine {
        parked: Arc<Mutex<Vec<Completion>>>,
    }

    impl Engine for ParkingEngine {
        fn on_output(&mut self, _callback: OutputCallback) {}

        fn call(&mut self, _goal: &str, _options: CallOptions) -> Outcome {
            let parked = Arc::clone(&self.parked);
            Suspension::host_call(
                move |completion| parked.lock().unwrap().push(completion),
                |_| prompt(),
            )
            .into()
        }

        fn trace_action(&mut self, _action: TraceAction, _event: &TraceEvent) -> bool {
            false
        }

        fn flush_output(&mut self) {}
    }

    fn handler() -> ShellHandler<TrueEngine> {
        let mut handler = ShellHandler::new(TrueEngine, ShellConfig::default());
        handler.session_mut().start().unwrap();
        handler
    }

    #[test]
    fn test_keys_echo_input_line() {
        let mut h = handler();
        let replies = h
            .handle(ClientMessage::Key {
                key: toplevel_session::Key::Char('x'),
            })
            .unwrap();
        assert_eq!(
            replies,
            [ServerMessage::InputLine {
                text: "x".to_string()
            }]
        );
    }

    #[test]
    fn test_ping_and_bad_file_name() {
        let mut h = handler();
        assert_eq!(h.handle(ClientMessage::Ping).unwrap(), [ServerMessage::Pong]);
        let err = h
            .handle(ClientMessage::Consult {
                file: Some("../x".to_string()),
                content: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, TransportError::FileName(_)));
        assert_eq!(h.workspace().files().list().len(), 1);
    }

    #[test]
    fn test_collapse_toggles_record() {
        let mut h = handler();
        h.handle(ClientMessage::Submit {
            text: "true".to_string(),
        })
        .unwrap();
        let id = h.session().sink().snapshot().queries()[0].id;
        h.handle(ClientMessage::Collapse {
            query: id,
            collapsed: None,
        })
        .unwrap();
        assert!(h.session().sink().snapshot().queries()[0].collapsed);
        h.handle(ClientMessage::Close { query: id }).unwrap();
        assert!(h.session().sink().snapshot().queries().is_empty());
    }

    #[tokio::test]
    async fn test_run_shell_reports_events() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let h = ShellHandler::new(TrueEngine, ShellConfig::default());
        let shell = tokio::spawn(run_shell(h, in_rx, out_tx));

        in_tx.send(ClientMessage::Ping).unwrap();
        in_tx
            .send(ClientMessage::Submit {
                text: "true".to_string(),
            })
            .unwrap();

        let mut seen = Vec::new();
        while let Some(msg) = out_rx.recv().await {
            let done = msg
                == ServerMessage::Event {
                    event: ShellEvent::QueryStarted {
                        query: 0,
                        text: "true.".to_string(),
                    },
                };
            seen.push(msg);
            if done {
                break;
            }
        }
        assert!(seen.contains(&ServerMessage::Pong));
        assert!(seen.contains(&ServerMessage::Event {
            event: ShellEvent::ModeChanged {
                mode: Mode::AwaitingCommand
            }
        }));

        drop(in_tx);
        shell.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_persist_saves_history() {
        use toplevel_session::storage::{HISTORY_KEY, MemoryStorage};

        let mut h = handler();
        h.handle(ClientMessage::Submit {
            text: "true".to_string(),
        })
        .unwrap();
        let storage = MemoryStorage::new();
        h.persist(&storage).await.unwrap();
        assert_eq!(
            storage.get(HISTORY_KEY).await.unwrap().as_deref(),
            Some(r#"["true."]"#)
        );
    }

    #[tokio::test]
    async fn test_run_shell_ends_on_protocol_error() {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let engine = ParkingEngine::default();
        let parked = Arc::clone(&engine.parked);
        let h = ShellHandler::new(engine, ShellConfig::default());
        h.session().post(Task::Resume {
            command: "true".to_string(),
        });

        let err = run_shell(h, in_rx, out_tx).await.err().unwrap();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            TransportError::Session(SessionError::Protocol(ProtocolError::NoSuspension))
        ));
        assert_eq!(parked.lock().unwrap().len(), 1);

        let mut errors = 0;
        while let Ok(msg) = out_rx.try_recv() {
            if matches!(msg, ServerMessage::Error { .. }) {
                errors += 1;
            }
        }
        assert_eq!(errors, 1);
        drop(in_tx);
    }

    #[test]
    fn test_mode_errors_are_not_fatal() {
        let mut h = ShellHandler::new(ParkingEngine::default(), ShellConfig::default());
        h.session_mut().start().unwrap();
        let err = h
            .handle(ClientMessage::Consult {
                file: None,
                content: "p.".to_string(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Session(SessionError::WrongMode { .. })
        ));
        assert!(!err.is_fatal());
        assert_eq!(h.session().mode(), Mode::HostDelegated);
    }
}
