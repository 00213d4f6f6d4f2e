//! End-to-end session scenarios against a scripted engine.

mod common;

use std::sync::Arc;

use common::{controller, prompt};
use toplevel_core::{
    Channel, Mode, OutputSink, ShellConfig, ShellEvent, SuspensionKind, TraceAction,
};
use toplevel_session::{
    AbortDisposition, Dispatch, InputDispatcher, Key, MoreAction, OperatorAction, SessionError,
    Workspace, storage::MemoryStorage,
};

const ABORT_NOTICE: &str = "print_message(informational, unwind(abort))";

fn count(log: &[String], entry: &str) -> usize {
    log.iter().filter(|e| *e == entry).count()
}

#[test]
fn test_query_output_lands_in_answer() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("X = 1").unwrap();

    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert_eq!(state.lock().unwrap().log, ["wasm_query_loop", "X = 1."]);

    let transcript = c.sink().snapshot();
    let record = transcript.last_query().unwrap();
    assert_eq!(record.text, "X = 1.");
    assert_eq!(record.answers.len(), 1);
    assert_eq!(record.answers[0].text(), "true.");
    assert!(transcript.current().is_none());
}

#[test]
fn test_redo_opens_sibling_answer() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("member(X, [a,b])").unwrap();
    assert_eq!(c.mode(), Mode::AwaitingMore);
    assert_eq!(c.pending(), Some(SuspensionKind::MoreAnswers));

    c.reply_more(MoreAction::Redo).unwrap();
    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert!(state.lock().unwrap().log.contains(&"redo".to_string()));

    let transcript = c.sink().snapshot();
    let record = transcript.last_query().unwrap();
    assert_eq!(record.answers.len(), 2);
    assert_eq!(record.answers[0].text(), "X = a;");
    assert_eq!(record.answers[1].text(), "X = b.");
}

#[test]
fn test_continue_swallows_blank_line() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("member(X, [a,b]).").unwrap();
    c.reply_more(MoreAction::Continue).unwrap();

    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert!(state.lock().unwrap().log.contains(&"continue".to_string()));

    let transcript = c.sink().snapshot();
    let record = transcript.last_query().unwrap();
    assert_eq!(record.answers.len(), 1);
    assert_eq!(record.answers[0].text(), "X = a.");
    assert!(transcript.scrollback().iter().all(|f| !f.is_blank()));
}

#[test]
fn test_tracer_steps_and_side_channel() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("trace, foo").unwrap();
    assert_eq!(c.mode(), Mode::Tracing);
    assert_eq!(state.lock().unwrap().trace_actions, [TraceAction::Print]);

    c.reply_trace(TraceAction::Goals).unwrap();
    assert_eq!(c.mode(), Mode::Tracing);
    assert_eq!(
        state.lock().unwrap().trace_actions,
        [TraceAction::Print, TraceAction::Goals]
    );
    assert!(!state.lock().unwrap().log.contains(&"goals".to_string()));

    c.reply_trace(TraceAction::Creep).unwrap();
    assert_eq!(c.mode(), Mode::Tracing);
    c.reply_trace(TraceAction::Creep).unwrap();
    assert_eq!(c.mode(), Mode::AwaitingCommand);

    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, "creep"), 2);
    assert_eq!(count(&log, "nl(user_error)"), 3);

    let transcript = c.sink().snapshot();
    let answer = &transcript.last_query().unwrap().answers[0];
    let marker = answer
        .fragments()
        .iter()
        .find(|f| f.text == " [creep]")
        .unwrap();
    assert_eq!(marker.channel, Channel::Stderr);
    assert_eq!(marker.sgr.as_ref().and_then(|s| s.color.as_deref()), Some("#888"));
    assert!(answer.text().contains("call: (1) foo ?"));
    assert!(answer.text().ends_with("true."));
}

#[test]
fn test_redo_twice_then_continue() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("member(X, [a,b,c,d])").unwrap();
    c.reply_more(MoreAction::Redo).unwrap();
    c.reply_more(MoreAction::Redo).unwrap();
    assert_eq!(c.mode(), Mode::AwaitingMore);
    c.reply_more(MoreAction::Continue).unwrap();
    assert_eq!(c.mode(), Mode::AwaitingCommand);

    let log = state.lock().unwrap().log.clone();
    assert_eq!(log[log.len() - 3..], ["redo", "redo", "continue"]);

    let transcript = c.sink().snapshot();
    let record = transcript.last_query().unwrap();
    assert_eq!(record.answers.len(), 3);
    assert_eq!(record.answers[0].text(), "X = a;");
    assert_eq!(record.answers[1].text(), "X = b;");
    assert_eq!(record.answers[2].text(), "X = c.");
}

#[test]
fn test_cooperative_yield_resumes_on_tick_and_aborts() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("loop").unwrap();
    assert_eq!(c.mode(), Mode::Running);
    assert_eq!(c.pending(), Some(SuspensionKind::CooperativeYield));

    for _ in 0..3 {
        assert!(c.tick().unwrap());
        assert_eq!(c.mode(), Mode::Running);
    }
    assert_eq!(count(&state.lock().unwrap().log, "true"), 3);

    assert_eq!(c.abort(), AbortDisposition::Signalled);
    assert!(c.tick().unwrap());
    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert!(!c.tick().unwrap());

    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, ABORT_NOTICE), 1);
    assert_eq!(count(&log, "wasm_query_loop"), 2);
}

#[test]
fn test_abort_without_handle_is_injected_at_next_resume() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("busy").unwrap();

    assert_eq!(c.abort(), AbortDisposition::Latched);
    assert_eq!(c.abort(), AbortDisposition::AlreadyLatched);
    assert!(c.tick().unwrap());

    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert!(!c.abort_latched());
    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, "wasm_abort"), 1);
    assert_eq!(count(&log, "true"), 0);
    assert_eq!(count(&log, ABORT_NOTICE), 1);
}

#[test]
fn test_latched_abort_preempts_more_reply() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("member(X, [a,b])").unwrap();
    assert_eq!(c.abort(), AbortDisposition::Latched);

    c.reply_more(MoreAction::Redo).unwrap();
    assert_eq!(c.mode(), Mode::AwaitingCommand);

    let log = state.lock().unwrap().log.clone();
    assert!(log.contains(&"wasm_abort".to_string()));
    assert!(!log.contains(&"redo".to_string()));
    let transcript = c.sink().snapshot();
    assert_eq!(transcript.last_query().unwrap().answers.len(), 1);
}

#[test]
fn test_host_call_completion_is_delivered() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("host").unwrap();
    assert_eq!(c.mode(), Mode::HostDelegated);
    assert!(c.pending().is_none());

    let completion = state.lock().unwrap().completions.pop().unwrap();
    completion.complete(prompt(Arc::clone(&state)));
    assert!(c.tick().unwrap());
    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert_eq!(count(&state.lock().unwrap().log, "wasm_query_loop"), 1);
}

#[test]
fn test_abort_during_host_call_is_injected_on_delivery() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("host").unwrap();
    assert_eq!(c.abort(), AbortDisposition::Latched);

    let completion = state.lock().unwrap().completions.pop().unwrap();
    completion.complete(prompt(Arc::clone(&state)));
    assert!(c.tick().unwrap());

    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert!(!c.abort_latched());
    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, "wasm_abort"), 1);
    assert_eq!(count(&log, ABORT_NOTICE), 1);
    assert_eq!(count(&log, "wasm_query_loop"), 2);
}

#[test]
fn test_abort_signals_running_host_call() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("remote").unwrap();

    assert_eq!(c.abort(), AbortDisposition::Signalled);
    assert!(state.lock().unwrap().abort_signalled());
    assert!(!c.abort_latched());
    assert_eq!(c.mode(), Mode::HostDelegated);
}

#[test]
fn test_abort_after_host_posted_is_latched() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("remote").unwrap();

    let completion = state.lock().unwrap().completions.pop().unwrap();
    completion.complete(prompt(Arc::clone(&state)));
    assert_eq!(c.abort(), AbortDisposition::Latched);
    assert!(!state.lock().unwrap().abort_signalled());

    assert!(c.tick().unwrap());
    assert_eq!(c.mode(), Mode::AwaitingCommand);
    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, "wasm_abort"), 1);
    assert_eq!(count(&log, ABORT_NOTICE), 1);
}

#[test]
fn test_dropped_host_call_restarts_toplevel() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("host").unwrap();

    state.lock().unwrap().completions.clear();
    assert!(c.tick().unwrap());
    assert_eq!(c.mode(), Mode::AwaitingCommand);
    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, "wasm_query_loop"), 2);
    assert_eq!(count(&log, ABORT_NOTICE), 0);
}

#[test]
fn test_failure_restarts_toplevel() {
    let (mut c, state) = controller();
    c.start().unwrap();
    c.submit("crash").unwrap();

    assert_eq!(c.mode(), Mode::AwaitingCommand);
    assert_eq!(c.pending(), Some(SuspensionKind::GoalRequest));
    let log = state.lock().unwrap().log.clone();
    assert_eq!(count(&log, "wasm_query_loop"), 2);
    assert_eq!(count(&log, ABORT_NOTICE), 0);
}

#[test]
fn test_new_query_collapses_previous() {
    let (mut c, _) = controller();
    c.start().unwrap();
    let mut events = c.sink().subscribe();
    c.submit("a").unwrap();
    c.submit("b").unwrap();

    let transcript = c.sink().snapshot();
    assert!(transcript.queries()[0].collapsed);
    assert!(!transcript.queries()[1].collapsed);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let first = transcript.queries()[0].id;
    assert!(seen.contains(&ShellEvent::QueryCollapsed {
        query: first,
        collapsed: true
    }));
    assert!(seen.contains(&ShellEvent::ModeChanged {
        mode: Mode::Running
    }));
    assert_eq!(
        seen.last(),
        Some(&ShellEvent::ModeChanged {
            mode: Mode::AwaitingCommand
        })
    );
}

#[test]
fn test_stimulus_in_wrong_mode_is_rejected() {
    let (mut c, _) = controller();
    assert!(matches!(
        c.submit("x"),
        Err(SessionError::WrongMode {
            expected: Mode::AwaitingCommand,
            actual: Mode::Idle
        })
    ));
    c.start().unwrap();
    c.submit("member(X, [a,b])").unwrap();
    assert!(c.run_query("true").is_err());
    assert!(c.history().len() == 1);
}

#[test]
fn test_dispatcher_history_navigation() {
    let (mut c, _) = controller();
    let mut input = InputDispatcher::new();
    c.start().unwrap();

    for text in ["first", "second"] {
        input
            .dispatch(OperatorAction::Submit { text: text.into() }, &mut c)
            .unwrap();
    }
    for ch in "dra".chars() {
        input
            .dispatch(OperatorAction::Key { key: Key::Char(ch) }, &mut c)
            .unwrap();
    }

    let mut press = |key| {
        input.dispatch(OperatorAction::Key { key }, &mut c).unwrap();
        input.line().to_string()
    };
    assert_eq!(press(Key::Up), "second.");
    assert_eq!(press(Key::Up), "first.");
    assert_eq!(press(Key::Up), "first.");
    assert_eq!(press(Key::Down), "second.");
    assert_eq!(press(Key::Down), "dra");
    assert_eq!(press(Key::Down), "dra");
}

#[test]
fn test_dispatcher_routes_keys_by_mode() {
    let (mut c, state) = controller();
    let mut input = InputDispatcher::new();
    c.start().unwrap();

    input.set_line("member(X, [a,b])");
    let handled = input
        .dispatch(OperatorAction::Key { key: Key::Enter }, &mut c)
        .unwrap();
    assert_eq!(handled, Dispatch::Handled);
    assert_eq!(input.line(), "");
    assert_eq!(c.mode(), Mode::AwaitingMore);

    input
        .dispatch(OperatorAction::Key { key: Key::Char(';') }, &mut c)
        .unwrap();
    assert!(state.lock().unwrap().log.contains(&"redo".to_string()));

    input.set_line("trace, foo");
    input
        .dispatch(OperatorAction::Key { key: Key::Enter }, &mut c)
        .unwrap();
    assert_eq!(c.mode(), Mode::Tracing);
    input
        .dispatch(OperatorAction::Key { key: Key::Char('g') }, &mut c)
        .unwrap();
    assert_eq!(c.mode(), Mode::Tracing);
    let ignored = input
        .dispatch(
            OperatorAction::More {
                reply: MoreAction::Redo,
            },
            &mut c,
        )
        .unwrap();
    assert_eq!(ignored, Dispatch::Ignored);
    input
        .dispatch(OperatorAction::Key { key: Key::Char('n') }, &mut c)
        .unwrap();
    assert_eq!(c.mode(), Mode::AwaitingCommand);

    let blank = input
        .dispatch(OperatorAction::Key { key: Key::Enter }, &mut c)
        .unwrap();
    assert_eq!(blank, Dispatch::Ignored);
}

#[test]
fn test_consult_stores_file_and_runs_query() {
    let (mut c, state) = controller();
    let mut ws = Workspace::new(c.config());
    c.start().unwrap();

    ws.set_text("p(1).");
    ws.consult(&mut c).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(
        state.stored,
        [("/prolog/program.pl".to_string(), "p(1).".to_string())]
    );
    assert!(
        state
            .log
            .contains(&"consult('/prolog/program.pl').".to_string())
    );
    assert!(c.history().is_empty());
}

#[test]
fn test_consult_outside_prompt_stores_nothing() {
    let (mut c, state) = controller();
    let mut ws = Workspace::new(c.config());
    c.start().unwrap();
    c.submit("member(X, [a,b])").unwrap();

    ws.set_text("p(1).");
    assert!(matches!(
        ws.consult(&mut c),
        Err(SessionError::WrongMode {
            expected: Mode::AwaitingCommand,
            actual: Mode::AwaitingMore
        })
    ));
    assert!(state.lock().unwrap().stored.is_empty());
    assert_eq!(c.mode(), Mode::AwaitingMore);
}

#[tokio::test]
async fn test_session_history_survives_restore() {
    let storage = MemoryStorage::new();
    let config = ShellConfig::default();

    let (mut c, _) = controller();
    let mut ws = Workspace::new(&config);
    c.start().unwrap();
    c.submit("X = 1").unwrap();
    ws.persist(c.history(), &storage).await.unwrap();

    let (engine, _) = common::ScriptEngine::new();
    let mut restored =
        toplevel_session::SessionController::new(engine, config.clone(), Arc::new(OutputSink::new()));
    let (_, history) = Workspace::restore(&config, &storage).await.unwrap();
    restored.set_history(history);
    assert_eq!(restored.history_mut().up(""), Some("X = 1.".to_string()));
}
