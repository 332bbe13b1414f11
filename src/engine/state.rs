//! Apply lifecycle
//!
//! ```text
//! Received -> Validated -> Resolved -> Serialized -> Computed -> Persisted -> Released
//!     \           \           \            \            \
//!      +-----------+-----------+------------+------------+--> Rejected -> Released
//! ```
//!
//! A conflict on commit goes `Rejected -> Released -> Serialized` and runs the
//! serialized section again. Pre-lock rejections end at `Rejected`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Received,
    Validated,
    Resolved,
    Serialized,
    Computed,
    Rejected,
    Persisted,
    Released,
}

impl ApplyPhase {
    pub fn can_advance_to(self, next: ApplyPhase) -> bool {
        use ApplyPhase::*;

        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, Resolved)
                | (Resolved, Serialized)
                | (Serialized, Computed)
                | (Computed, Persisted)
                | (Received | Validated | Resolved | Serialized | Computed, Rejected)
                | (Persisted | Rejected, Released)
                | (Released, Serialized)
        )
    }

    /// Whether the account's serialization unit is held in this phase
    pub fn holds_lock(self) -> bool {
        matches!(self, Self::Serialized | Self::Computed | Self::Persisted)
    }
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Follows one apply through its phases
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: ApplyPhase,
    label: String,
}

impl PhaseTracker {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            phase: ApplyPhase::Received,
            label: label.into(),
        }
    }

    pub(crate) fn phase(&self) -> ApplyPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: ApplyPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal apply transition {} -> {}",
            self.phase,
            next
        );
        tracing::trace!(apply = %self.label, from = %self.phase, to = %next, "Apply phase");
        self.phase = next;
    }

    /// Mark a rejection unless the apply already ended
    pub(crate) fn reject(&mut self) {
        if self.phase.can_advance_to(ApplyPhase::Rejected) {
            self.advance(ApplyPhase::Rejected);
        }
    }
}
