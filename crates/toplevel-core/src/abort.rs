//! Deferred abort requests.

/// Records an abort that could not be delivered directly.
///
/// The latch is consumed at the next resumption point, where it turns into
/// the engine's abort command.
#[derive(Debug, Default)]
pub struct AbortLatch {
    requested: bool,
}

impl AbortLatch {
    /// Create a cleared latch.
    #[must_use]
    pub const fn new() -> Self {
        Self { requested: false }
    }

    /// Set the latch. Returns `false` if it was already set.
    pub fn request(&mut self) -> bool {
        let newly = !self.requested;
        self.requested = true;
        newly
    }

    /// Clear the latch, returning whether it was set.
    pub fn take(&mut self) -> bool {
        let was = self.requested;
        self.requested = false;
        was
    }

    /// Whether an abort is pending.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_idempotent() {
        let mut latch = AbortLatch::new();
        assert!(latch.request());
        assert!(!latch.request());
        assert!(latch.take());
        assert!(!latch.take());
    }

    #[test]
    fn test_starts_clear() {
        assert!(!AbortLatch::default().is_set());
    }
}
