//! Scripted engine for session scenarios.
//!
//! The toplevel knows a handful of canned queries:
//! - `member(X, [a,b]).` - two answers with a more-answers prompt between
//! - `member(X, [a,b,c,d]).` - four answers, prompting after each but the last
//! - `trace, foo.` - two debugger steps
//! - `loop.` - yields forever, abortable through its handle
//! - `busy.` - yields forever, no abort handle
//! - `host.` - delegated to host code
//! - `remote.` - delegated to host code, abortable through its handle
//! - `crash.` - fails without abort
//! - anything else prints `true.`

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use toplevel_core::{
    AbortHandle, CallOptions, Channel, Completion, Engine, Outcome, OutputCallback, OutputSink,
    ShellConfig, Suspension, TraceAction, TraceEvent,
};
use toplevel_session::SessionController;

#[derive(Default)]
pub struct State {
    /// Every goal, query and resume command the engine received.
    pub log: Vec<String>,
    /// Trace side-channel actions.
    pub trace_actions: Vec<TraceAction>,
    /// Files handed over with `store_file`.
    pub stored: Vec<(String, String)>,
    /// Completions of pending host calls.
    pub completions: Vec<Completion>,
    pending: Vec<(String, Channel)>,
    abort_flag: Arc<AtomicBool>,
}

impl State {
    /// Whether an abort handle was signalled.
    pub fn abort_signalled(&self) -> bool {
        self.abort_flag.load(Ordering::SeqCst)
    }
}

pub type Shared = Arc<Mutex<State>>;

pub struct ScriptEngine {
    state: Shared,
    callback: Option<OutputCallback>,
}

impl ScriptEngine {
    pub fn new() -> (Self, Shared) {
        let state = Shared::default();
        (
            Self {
                state: Arc::clone(&state),
                callback: None,
            },
            state,
        )
    }
}

pub fn controller() -> (SessionController<ScriptEngine>, Shared) {
    let (engine, state) = ScriptEngine::new();
    let sink = Arc::new(OutputSink::new());
    (
        SessionController::new(engine, ShellConfig::default(), sink),
        state,
    )
}

fn print(state: &Shared, text: &str) {
    state
        .lock()
        .unwrap()
        .pending
        .push((text.to_string(), Channel::Stdout));
}

fn record(state: &Shared, command: &str) {
    state.lock().unwrap().log.push(command.to_string());
}

pub fn prompt(state: Shared) -> Outcome {
    Suspension::goal_request(move |query| {
        record(&state, query);
        run_query(state, query)
    })
    .into()
}

fn run_query(state: Shared, query: &str) -> Outcome {
    match query {
        "wasm_abort" => Outcome::aborted(),
        "member(X, [a,b])." => answers(state, VecDeque::from(["a", "b"])),
        "member(X, [a,b,c,d])." => answers(state, VecDeque::from(["a", "b", "c", "d"])),
        "trace, foo." => trace(
            state,
            VecDeque::from([
                TraceEvent::new("call", 1, "foo"),
                TraceEvent::new("exit", 1, "foo"),
            ]),
        ),
        "loop." => spin(state, true),
        "busy." => spin(state, false),
        "host." => {
            let for_host = Arc::clone(&state);
            Suspension::host_call(
                move |completion| for_host.lock().unwrap().completions.push(completion),
                move |command| {
                    record(&state, command);
                    Outcome::aborted()
                },
            )
            .into()
        }
        "remote." => {
            let for_host = Arc::clone(&state);
            let signal = Arc::clone(&state.lock().unwrap().abort_flag);
            Suspension::host_call(
                move |completion| for_host.lock().unwrap().completions.push(completion),
                move |command| {
                    record(&state, command);
                    Outcome::aborted()
                },
            )
            .with_abort(AbortHandle::new(move || signal.store(true, Ordering::SeqCst)))
            .into()
        }
        "crash." => Outcome::failed("boom"),
        _ => {
            print(&state, "true.");
            prompt(state)
        }
    }
}

fn answers(state: Shared, mut values: VecDeque<&'static str>) -> Outcome {
    let Some(value) = values.pop_front() else {
        print(&state, "false.");
        return prompt(state);
    };
    print(&state, &format!("X = {value}"));
    if values.is_empty() {
        print(&state, ".");
        return prompt(state);
    }
    Suspension::more_answers(move |reply| {
        record(&state, reply);
        match reply {
            "redo" => {
                print(&state, "");
                answers(state, values)
            }
            "continue" => {
                print(&state, "");
                prompt(state)
            }
            "wasm_abort" => Outcome::aborted(),
            other => Outcome::failed(format!("unexpected reply {other}")),
        }
    })
    .into()
}

fn trace(state: Shared, mut steps: VecDeque<TraceEvent>) -> Outcome {
    let Some(event) = steps.pop_front() else {
        print(&state, "true.");
        return prompt(state);
    };
    Suspension::debug_step(event, move |action| {
        record(&state, action);
        match action {
            "creep" | "skip" | "leap" => trace(state, steps),
            "nodebug" => {
                print(&state, "true.");
                prompt(state)
            }
            "abort" | "wasm_abort" => Outcome::aborted(),
            other => Outcome::failed(format!("unexpected action {other}")),
        }
    })
    .into()
}

fn spin(state: Shared, abortable: bool) -> Outcome {
    let flag = Arc::clone(&state.lock().unwrap().abort_flag);
    let signal = Arc::clone(&flag);
    let suspension = Suspension::cooperative_yield(move |command| {
        record(&state, command);
        if command == "wasm_abort" || flag.swap(false, Ordering::SeqCst) {
            return Outcome::aborted();
        }
        spin(state, abortable)
    });
    if abortable {
        suspension
            .with_abort(AbortHandle::new(move || signal.store(true, Ordering::SeqCst)))
            .into()
    } else {
        suspension.into()
    }
}

impl Engine for ScriptEngine {
    fn on_output(&mut self, callback: OutputCallback) {
        self.callback = Some(callback);
    }

    fn call(&mut self, goal: &str, options: CallOptions) -> Outcome {
        record(&self.state, goal);
        match goal {
            "wasm_query_loop" => {
                assert!(options.asynchronous);
                prompt(Arc::clone(&self.state))
            }
            "nl(user_error)" => {
                assert!(options.nodebug);
                self.state
                    .lock()
                    .unwrap()
                    .pending
                    .push(("\n".to_string(), Channel::Stderr));
                Outcome::completed()
            }
            "print_message(informational, unwind(abort))" => {
                self.state
                    .lock()
                    .unwrap()
                    .pending
                    .push(("% Execution Aborted".to_string(), Channel::Stderr));
                Outcome::completed()
            }
            other => Outcome::failed(format!("unknown goal {other}")),
        }
    }

    fn trace_action(&mut self, action: TraceAction, event: &TraceEvent) -> bool {
        let mut state = self.state.lock().unwrap();
        state.trace_actions.push(action);
        let line = match action {
            TraceAction::Print => format!("   {}: ({}) {} ?", event.port, event.depth, event.goal),
            TraceAction::Goals => format!("[{}] {}", event.depth, event.goal),
            _ => return false,
        };
        state.pending.push((line, Channel::Stderr));
        true
    }

    fn flush_output(&mut self) {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        if let Some(callback) = &self.callback {
            for (text, channel) in pending {
                callback(&text, channel, None);
            }
        }
    }

    fn store_file(&mut self, path: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .stored
            .push((path.to_string(), text.to_string()));
    }
}
