//! The process-wide record of the currently active container.

use std::sync::{Arc, Mutex, PoisonError};

use voxrun_engine::ContainerId;

/// Shared handle holding the active container identifier, if any.
///
/// Invariant: at most one non-empty value per process. Writers follow
/// the capture-then-clear discipline — [`take`](Self::take) captures
/// and empties in one step, and [`clear`](Self::clear) only empties a
/// matching identifier, so a racing completion path can never wipe a
/// newer job's identifier.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    inner: Arc<Mutex<Option<ContainerId>>>,
}

impl JobHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the active container, if one is recorded.
    pub fn active(&self) -> Option<ContainerId> {
        self.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Record a newly created container. Fails when a job is already
    /// recorded, returning the occupying identifier unchanged.
    pub(crate) fn set(&self, id: ContainerId) -> Result<(), ContainerId> {
        let mut slot = self.lock();
        match &*slot {
            Some(existing) => Err(existing.clone()),
            None => {
                *slot = Some(id);
                Ok(())
            }
        }
    }

    /// Capture and clear the identifier in one step.
    pub(crate) fn take(&self) -> Option<ContainerId> {
        self.lock().take()
    }

    /// Clear the slot only if it still holds `id`. Idempotent; a
    /// mismatch means a different (newer) job owns the slot.
    pub(crate) fn clear(&self, id: &str) -> bool {
        let mut slot = self.lock();
        if slot.as_deref() == Some(id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    // The critical sections are a few machine instructions and never
    // panic, so a poisoned lock still holds consistent data.
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ContainerId>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
