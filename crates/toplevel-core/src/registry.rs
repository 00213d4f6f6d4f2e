//! The single live suspension slot.

use thiserror::Error;

use crate::suspension::{AbortHandle, Outcome, Suspension, SuspensionKind};

/// Misuse of the resume protocol. Always a programming error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No suspension to resume")]
    NoSuspension,
    #[error("A {0:?} suspension is already outstanding")]
    AlreadySuspended(SuspensionKind),
}

/// Holds zero or one suspension.
#[derive(Debug, Default)]
pub struct ContinuationRegistry {
    slot: Option<Suspension>,
}

impl ContinuationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the live suspension.
    ///
    /// # Errors
    /// Returns `AlreadySuspended` if one is outstanding; the new suspension
    /// is dropped unresumed.
    pub fn register(&mut self, suspension: Suspension) -> Result<(), ProtocolError> {
        if let Some(existing) = &self.slot {
            return Err(ProtocolError::AlreadySuspended(existing.kind()));
        }
        tracing::trace!(kind = ?suspension.kind(), "registered suspension");
        self.slot = Some(suspension);
        Ok(())
    }

    /// Remove the live suspension without resuming it.
    ///
    /// # Errors
    /// Returns `NoSuspension` if the registry is empty.
    pub fn take(&mut self) -> Result<Suspension, ProtocolError> {
        self.slot.take().ok_or(ProtocolError::NoSuspension)
    }

    /// Remove the live suspension and resume it with `command`.
    ///
    /// # Errors
    /// Returns `NoSuspension` if the registry is empty.
    pub fn take_and_resume(&mut self, command: &str) -> Result<Outcome, ProtocolError> {
        let suspension = self.take()?;
        tracing::debug!(kind = ?suspension.kind(), %command, "resuming");
        Ok(suspension.resume(command))
    }

    /// Kind of the live suspension.
    #[must_use]
    pub fn kind(&self) -> Option<SuspensionKind> {
        self.slot.as_ref().map(Suspension::kind)
    }

    /// The live suspension.
    #[must_use]
    pub const fn current(&self) -> Option<&Suspension> {
        self.slot.as_ref()
    }

    /// Direct abort capability of the live suspension.
    #[must_use]
    pub fn abort_handle(&self) -> Option<&AbortHandle> {
        self.slot.as_ref().and_then(Suspension::abort_handle)
    }

    /// Whether no suspension is registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counting(hits: &Arc<AtomicUsize>) -> Suspension {
        let hits = Arc::clone(hits);
        Suspension::more_answers(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Outcome::failed("done")
        })
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let mut reg = ContinuationRegistry::new();
        reg.register(Suspension::goal_request(|_| Outcome::aborted()))
            .unwrap();
        let err = reg
            .register(Suspension::more_answers(|_| Outcome::aborted()))
            .unwrap_err();
        assert_eq!(err, ProtocolError::AlreadySuspended(SuspensionKind::GoalRequest));
        assert_eq!(reg.kind(), Some(SuspensionKind::GoalRequest));
    }

    #[test]
    fn test_resume_exactly_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut reg = ContinuationRegistry::new();
        reg.register(counting(&hits)).unwrap();

        assert!(reg.take_and_resume("redo").is_ok());
        assert_eq!(
            reg.take_and_resume("redo").unwrap_err(),
            ProtocolError::NoSuspension
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_register_after_resume_is_allowed() {
        let mut reg = ContinuationRegistry::new();
        reg.register(Suspension::goal_request(|_| Outcome::aborted()))
            .unwrap();
        reg.take_and_resume("true.").unwrap();
        assert!(reg
            .register(Suspension::goal_request(|_| Outcome::aborted()))
            .is_ok());
    }
}
