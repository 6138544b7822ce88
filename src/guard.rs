//! [`ProcessLifecycleGuard`]: one-way startup gate read by the connection hook.

use std::sync::atomic::{AtomicBool, Ordering};

/// Two-state machine gating session key injection: `Uninitialized → Initialized`.
///
/// The transition is triggered exactly once, by successful completion of
/// keyring bootstrap, and never reversed. The flag is an [`AtomicBool`] with
/// `Release`/`Acquire` pairing so the flip — and everything bootstrap wrote
/// before it — is visible to every connection-acquire path that observes
/// `Initialized`.
#[derive(Debug, Default)]
pub struct ProcessLifecycleGuard {
    initialized: AtomicBool,
}

impl ProcessLifecycleGuard {
    /// Create a guard in the `Uninitialized` state.
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
        }
    }

    /// Mark bootstrap as complete. Calling this more than once is harmless.
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Returns `true` once bootstrap has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized() {
        assert!(!ProcessLifecycleGuard::new().is_initialized());
    }

    #[test]
    fn flips_once_and_stays() {
        let guard = ProcessLifecycleGuard::new();
        guard.mark_initialized();
        assert!(guard.is_initialized());
        // No reverse transition; a second mark is a no-op.
        guard.mark_initialized();
        assert!(guard.is_initialized());
    }
}
