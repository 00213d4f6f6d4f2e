//! Suspensions and outcomes of the resumable query protocol.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{scheduler::Completion, trace::TraceEvent};

/// One-shot continuation of a suspended engine call.
pub type ResumeFn = Box<dyn FnOnce(&str) -> Outcome + Send>;

/// Kind of a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuspensionKind {
    /// The toplevel wants the next query.
    GoalRequest,
    /// A solution was printed; redo or continue?
    MoreAnswers,
    /// The debugger stopped at a port.
    DebugStep,
    /// Fairness yield; always resumed with the yield command.
    CooperativeYield,
    /// Host code must complete the call.
    HostDelegatedCall,
}

/// Host code invoked for a `host-delegated-call` suspension.
pub struct HostCall(Box<dyn FnOnce(Completion) + Send>);

impl HostCall {
    /// Wrap a host callback.
    #[must_use]
    pub fn new(f: impl FnOnce(Completion) + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Run the callback with its completion handle.
    pub fn invoke(self, completion: Completion) {
        (self.0)(completion);
    }
}

impl fmt::Debug for HostCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostCall(..)")
    }
}

/// Kind-specific data of a suspension.
#[derive(Debug)]
pub enum Payload {
    GoalRequest,
    MoreAnswers,
    DebugStep(TraceEvent),
    CooperativeYield,
    HostDelegatedCall(HostCall),
}

impl Payload {
    /// Kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> SuspensionKind {
        match self {
            Self::GoalRequest => SuspensionKind::GoalRequest,
            Self::MoreAnswers => SuspensionKind::MoreAnswers,
            Self::DebugStep(_) => SuspensionKind::DebugStep,
            Self::CooperativeYield => SuspensionKind::CooperativeYield,
            Self::HostDelegatedCall(_) => SuspensionKind::HostDelegatedCall,
        }
    }
}

/// Direct cancellation capability exposed by some suspensions.
#[derive(Clone)]
pub struct AbortHandle(Arc<dyn Fn() + Send + Sync>);

impl AbortHandle {
    /// Wrap an abort function.
    #[must_use]
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Request cancellation.
    pub fn abort(&self) {
        (self.0)();
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle(..)")
    }
}

/// A paused engine call that can be resumed exactly once.
pub struct Suspension {
    payload: Payload,
    resume: ResumeFn,
    abort: Option<AbortHandle>,
}

impl Suspension {
    /// Create a suspension from a payload and its continuation.
    #[must_use]
    pub fn new(payload: Payload, resume: impl FnOnce(&str) -> Outcome + Send + 'static) -> Self {
        Self {
            payload,
            resume: Box::new(resume),
            abort: None,
        }
    }

    /// `goal-request` suspension.
    #[must_use]
    pub fn goal_request(resume: impl FnOnce(&str) -> Outcome + Send + 'static) -> Self {
        Self::new(Payload::GoalRequest, resume)
    }

    /// `more-answers` suspension.
    #[must_use]
    pub fn more_answers(resume: impl FnOnce(&str) -> Outcome + Send + 'static) -> Self {
        Self::new(Payload::MoreAnswers, resume)
    }

    /// `debug-step` suspension.
    #[must_use]
    pub fn debug_step(
        event: TraceEvent,
        resume: impl FnOnce(&str) -> Outcome + Send + 'static,
    ) -> Self {
        Self::new(Payload::DebugStep(event), resume)
    }

    /// `cooperative-yield` suspension.
    #[must_use]
    pub fn cooperative_yield(resume: impl FnOnce(&str) -> Outcome + Send + 'static) -> Self {
        Self::new(Payload::CooperativeYield, resume)
    }

    /// `host-delegated-call` suspension.
    ///
    /// `resume` is only used when a latched abort preempts the host call.
    #[must_use]
    pub fn host_call(
        call: impl FnOnce(Completion) + Send + 'static,
        resume: impl FnOnce(&str) -> Outcome + Send + 'static,
    ) -> Self {
        Self::new(Payload::HostDelegatedCall(HostCall::new(call)), resume)
    }

    /// Attach a direct abort capability.
    #[must_use]
    pub fn with_abort(mut self, handle: AbortHandle) -> Self {
        self.abort = Some(handle);
        self
    }

    /// Kind of this suspension.
    #[must_use]
    pub const fn kind(&self) -> SuspensionKind {
        self.payload.kind()
    }

    /// Kind-specific data.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Direct abort capability, if the suspension has one.
    #[must_use]
    pub const fn abort_handle(&self) -> Option<&AbortHandle> {
        self.abort.as_ref()
    }

    /// Continue the engine with `command`. Consumes the suspension.
    pub fn resume(self, command: &str) -> Outcome {
        (self.resume)(command)
    }

    /// Split into payload, continuation and abort capability.
    #[must_use]
    pub fn into_parts(self) -> (Payload, ResumeFn, Option<AbortHandle>) {
        (self.payload, self.resume, self.abort)
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspension")
            .field("payload", &self.payload)
            .field("abortable", &self.abort.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of an engine call or resume.
#[derive(Debug)]
pub enum Outcome {
    /// Execution paused again.
    Suspended(Suspension),
    /// Execution ended with an error; the toplevel must be restarted.
    Failed { reason: String, is_abort: bool },
}

impl Outcome {
    /// Failure caused by an abort.
    #[must_use]
    pub fn aborted() -> Self {
        Self::Failed {
            reason: "Execution Aborted".to_string(),
            is_abort: true,
        }
    }

    /// Any other failure.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            is_abort: false,
        }
    }

    /// A call that ran to the end without suspending.
    ///
    /// There is no success variant: side calls report completion as a
    /// failure with an empty reason, and a toplevel that returns this way
    /// is simply restarted.
    #[must_use]
    pub const fn completed() -> Self {
        Self::Failed {
            reason: String::new(),
            is_abort: false,
        }
    }

    /// Kind of the suspension, if suspended.
    #[must_use]
    pub const fn kind(&self) -> Option<SuspensionKind> {
        match self {
            Self::Suspended(s) => Some(s.kind()),
            Self::Failed { .. } => None,
        }
    }
}

impl From<Suspension> for Outcome {
    fn from(s: Suspension) -> Self {
        Self::Suspended(s)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_resume_passes_command() {
        let s = Suspension::goal_request(|cmd| Outcome::failed(cmd.to_string()));
        assert_eq!(s.kind(), SuspensionKind::GoalRequest);
        match s.resume("member(X,[1]).") {
            Outcome::Failed { reason, is_abort } => {
                assert_eq!(reason, "member(X,[1]).");
                assert!(!is_abort);
            }
            Outcome::Suspended(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_abort_handle_is_invoked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let s = Suspension::cooperative_yield(|_| Outcome::aborted())
            .with_abort(AbortHandle::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        s.abort_handle().unwrap().abort();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&SuspensionKind::HostDelegatedCall).unwrap();
        assert_eq!(json, "\"host-delegated-call\"");
    }
}
