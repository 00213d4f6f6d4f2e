//! A toy suspending logic engine.
//!
//! Good enough to drive the demos end to end: it runs a toplevel loop that
//! suspends for goals, enumerates solutions behind more-answers prompts,
//! steps through goals in trace mode, yields during `sleep/1` and hands
//! `host/1` calls to a background thread.
//!
//! Supported goals: facts from consulted files, `true`, `fail`, `=/2`,
//! `member/2`, `between/3`, and at the start of a query `trace`, `notrace`,
//! `sleep(Beats)`, `host(Millis)`, `throw(Error)`, `consult(File)`,
//! `listing` and `halt`.

pub mod solve;
pub mod term;

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use tracing::{debug, warn};

use toplevel_core::{
    AbortHandle, CallOptions, Channel, Engine, Outcome, OutputCallback, Sgr, Suspension,
    TraceAction, TraceEvent,
};

use crate::{
    solve::{Bindings, Database, resolve},
    term::{Term, parse_query},
};

/// Goal that runs the toplevel loop.
pub const TOPLEVEL_GOAL: &str = "wasm_query_loop";

/// Command that aborts a suspended query.
pub const ABORT_COMMAND: &str = "wasm_abort";

#[derive(Default)]
struct Inner {
    pending: Vec<(String, Channel, Option<Sgr>)>,
    callback: Option<OutputCallback>,
    files: HashMap<String, String>,
    db: Database,
    tracing: bool,
    depth: u32,
}

type Shared = Arc<Mutex<Inner>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn out(shared: &Shared, text: impl Into<String>) {
    lock(shared).pending.push((text.into(), Channel::Stdout, None));
}

fn err(shared: &Shared, text: impl Into<String>) {
    lock(shared).pending.push((text.into(), Channel::Stderr, None));
}

fn warning(shared: &Shared, text: &str) {
    lock(shared).pending.push((
        format!("Warning: {text}\n"),
        Channel::Stderr,
        Some(Sgr {
            color: Some("#c60".to_string()),
            bold: true,
            ..Sgr::default()
        }),
    ));
}

/// The demo engine.
#[derive(Clone, Default)]
pub struct DemoEngine {
    shared: Shared,
}

impl DemoEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether trace mode is on.
    #[must_use]
    pub fn tracing(&self) -> bool {
        lock(&self.shared).tracing
    }

    /// Number of loaded facts.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        lock(&self.shared).db.facts().len()
    }
}

impl Engine for DemoEngine {
    fn on_output(&mut self, callback: OutputCallback) {
        lock(&self.shared).callback = Some(callback);
    }

    fn call(&mut self, goal: &str, options: CallOptions) -> Outcome {
        debug!(goal, ?options, "engine call");
        let shared = &self.shared;
        match goal.trim().trim_end_matches('.') {
            TOPLEVEL_GOAL => {
                if !options.asynchronous {
                    warn!("toplevel needs asynchronous calls");
                    return Outcome::failed("toplevel started synchronously");
                }
                prompt(Arc::clone(shared))
            }
            "nl(user_error)" => {
                err(shared, "\n");
                Outcome::completed()
            }
            "print_message(informational, unwind(abort))" => {
                err(shared, "% Execution Aborted\n");
                Outcome::completed()
            }
            other => Outcome::failed(format!("unknown goal {other}")),
        }
    }

    fn trace_action(&mut self, action: TraceAction, event: &TraceEvent) -> bool {
        let shared = &self.shared;
        match action {
            TraceAction::Print => err(
                shared,
                format!("   {}: ({}) {} ?", capitalize(&event.port), event.depth, event.goal),
            ),
            TraceAction::Goals => err(shared, format!("     [{}] {}\n", event.depth, event.goal)),
            TraceAction::Listing => {
                let listing = listing(&lock(shared).db);
                err(shared, listing);
            }
            TraceAction::Help => err(
                shared,
                "Options: creep (c), leap (l), skip (s), retry (r), up (u), \
                 nodebug (n), abort (a), goals (g), listing (L), help (?)\n",
            ),
            _ => return false,
        }
        true
    }

    fn flush_output(&mut self) {
        let (pending, callback) = {
            let mut inner = lock(&self.shared);
            (std::mem::take(&mut inner.pending), inner.callback.clone())
        };
        if let Some(callback) = callback {
            for (text, channel, sgr) in pending {
                callback(&text, channel, sgr);
            }
        }
    }

    fn store_file(&mut self, path: &str, text: &str) {
        lock(&self.shared)
            .files
            .insert(path.to_string(), text.to_string());
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_uppercase().chain(chars).collect()
    })
}

fn listing(db: &Database) -> String {
    db.facts().iter().map(|f| format!("{f}.\n")).collect()
}

fn prompt(shared: Shared) -> Outcome {
    Suspension::goal_request(move |query| run_query(shared, query)).into()
}

fn run_query(shared: Shared, query: &str) -> Outcome {
    if query == ABORT_COMMAND {
        return Outcome::aborted();
    }
    let goals = match parse_query(query) {
        Ok(goals) => goals,
        Err(e) => {
            warning(&shared, &e.to_string());
            out(&shared, "false.\n");
            return prompt(shared);
        }
    };
    let Some((first, rest)) = goals.split_first() else {
        return prompt(shared);
    };
    lock(&shared).depth = 0;

    match (first.indicator(), first.args()) {
        (Some(("trace", 0)), _) => {
            lock(&shared).tracing = true;
            continue_with(shared, rest)
        }
        (Some(("notrace", 0)), _) => {
            lock(&shared).tracing = false;
            continue_with(shared, rest)
        }
        (Some(("halt", 0)), _) => Outcome::failed("halt"),
        (Some(("throw", 1)), [error]) => {
            warning(&shared, &format!("goal raised exception: {error}"));
            out(&shared, "false.\n");
            prompt(shared)
        }
        (Some(("sleep", 1)), [Term::Atom(beats)]) => match beats.parse::<u32>() {
            Ok(beats) => sleep(shared, beats, Arc::new(AtomicBool::new(false))),
            Err(_) => {
                warning(&shared, "sleep/1: integer expected");
                out(&shared, "false.\n");
                prompt(shared)
            }
        },
        (Some(("host", 1)), [Term::Atom(millis)]) => {
            host(shared, millis.parse().unwrap_or(0))
        }
        (Some(("consult", 1)), [file]) => {
            consult(&shared, &file.to_string());
            continue_with(shared, rest)
        }
        (Some(("listing", 0)), _) => {
            let listing = listing(&lock(&shared).db);
            out(&shared, listing);
            continue_with(shared, rest)
        }
        _ => {
            if lock(&shared).tracing {
                trace(shared, goals.clone(), 0)
            } else {
                answer(shared, &goals)
            }
        }
    }
}

/// Run the remaining goals of a query, or report success.
fn continue_with(shared: Shared, rest: &[Term]) -> Outcome {
    if rest.is_empty() {
        out(&shared, "true.\n");
        prompt(shared)
    } else if lock(&shared).tracing {
        trace(shared, rest.to_vec(), 0)
    } else {
        answer(shared, rest)
    }
}

fn consult(shared: &Shared, file: &str) {
    let path = file.trim_matches('\'');
    let text = lock(shared).files.get(path).cloned();
    let Some(text) = text else {
        warning(shared, &format!("source_sink `{path}' does not exist"));
        return;
    };
    match Database::load(&text) {
        Ok(db) => {
            let count = db.facts().len();
            lock(shared).db = db;
            debug!(path, count, "consulted");
        }
        Err(e) => warning(shared, &format!("{path}: {e}")),
    }
}

/// Step through the goals of a query in trace mode.
fn trace(shared: Shared, goals: Vec<Term>, index: usize) -> Outcome {
    let Some(goal) = goals.get(index) else {
        return answer(shared, &goals);
    };
    let depth = {
        let mut inner = lock(&shared);
        inner.depth += 1;
        inner.depth
    };
    let event = TraceEvent::new("call", depth, goal.to_string());
    Suspension::debug_step(event, move |action| match action {
        "creep" | "skip" | "leap" | "up" => trace(shared, goals, index + 1),
        "retry" => trace(shared, goals, index),
        "nodebug" => {
            lock(&shared).tracing = false;
            answer(shared, &goals)
        }
        _ => Outcome::aborted(),
    })
    .into()
}

/// Solve a query and present the solutions.
fn answer(shared: Shared, goals: &[Term]) -> Outcome {
    let db = lock(&shared).db.clone();
    match db.solve(goals) {
        Ok(solutions) => {
            let mut vars = Vec::new();
            for goal in goals {
                goal.vars(&mut vars);
            }
            vars.retain(|v| !v.starts_with('_'));
            present(shared, vars, solutions.into(), 0)
        }
        Err(e) => {
            warning(&shared, &e.to_string());
            out(&shared, "false.\n");
            prompt(shared)
        }
    }
}

fn render(vars: &[String], b: &Bindings) -> String {
    if vars.is_empty() {
        return "true".to_string();
    }
    vars.iter()
        .map(|v| format!("{v} = {}", resolve(&Term::Var(v.clone()), b)))
        .collect::<Vec<_>>()
        .join(",\n")
}

fn present(shared: Shared, vars: Vec<String>, mut solutions: VecDeque<Bindings>, shown: usize) -> Outcome {
    let Some(solution) = solutions.pop_front() else {
        if shown == 0 {
            out(&shared, "false.\n");
        }
        return prompt(shared);
    };
    out(&shared, render(&vars, &solution));
    if solutions.is_empty() {
        out(&shared, ".\n");
        return prompt(shared);
    }
    Suspension::more_answers(move |reply| match reply {
        "redo" => {
            out(&shared, "\n");
            present(shared, vars, solutions, shown + 1)
        }
        "continue" => {
            out(&shared, "\n");
            prompt(shared)
        }
        _ => Outcome::aborted(),
    })
    .into()
}

/// Yield `beats` times before succeeding.
fn sleep(shared: Shared, beats: u32, flag: Arc<AtomicBool>) -> Outcome {
    if beats == 0 {
        out(&shared, "true.\n");
        return prompt(shared);
    }
    let signal = Arc::clone(&flag);
    Suspension::cooperative_yield(move |command| {
        if command == ABORT_COMMAND || flag.load(Ordering::SeqCst) {
            return Outcome::aborted();
        }
        sleep(shared, beats - 1, flag)
    })
    .with_abort(AbortHandle::new(move || signal.store(true, Ordering::SeqCst)))
    .into()
}

/// Hand the call to a background thread that completes it after `millis`.
fn host(shared: Shared, millis: u64) -> Outcome {
    let cancelled = Arc::new(AtomicBool::new(false));
    let signal = Arc::clone(&cancelled);
    Suspension::host_call(
        move |completion| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(millis));
                let outcome = if cancelled.load(Ordering::SeqCst) {
                    Outcome::aborted()
                } else {
                    out(&shared, format!("host call done after {millis} ms\ntrue.\n"));
                    prompt(shared)
                };
                completion.complete(outcome);
            });
        },
        |_| Outcome::aborted(),
    )
    .with_abort(AbortHandle::new(move || signal.store(true, Ordering::SeqCst)))
    .into()
}
