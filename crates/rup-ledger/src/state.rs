//! Transaction lifecycle state machine.
//!
//! Explicit transitions for a transaction's resolution status:
//!
//! ```text
//!             Resolved                ResolutionFailed
//!  Pending ────────────► Mapped    Pending ────────────► Failed
//!  Failed  ────────────► Mapped    Failed  ────────────► Failed (no-op)
//!  Mapped  ────────────► Mapped (idempotent replay)
//! ```
//!
//! `Failed` is deliberately not terminal — a re-run or a human approval can
//! still map the transaction.  The one illegal move is un-mapping: once
//! `Mapped`, a resolution failure must not arrive, and callers treat the
//! error as an inconsistency to investigate.

use std::fmt;

use rup_schemas::TxStatus;

/// Events that drive a transaction's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// Resolution produced an approved ticker.
    Resolved { ticker: String },
    /// Every resolution tier was exhausted without an approved ticker.
    ResolutionFailed,
}

impl TxEvent {
    fn name(&self) -> &'static str {
        match self {
            TxEvent::Resolved { .. } => "Resolved",
            TxEvent::ResolutionFailed => "ResolutionFailed",
        }
    }
}

/// Returned when an event cannot legally be applied in the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: TxStatus,
    pub event: String,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal transaction transition: {} + {}",
            self.from.as_str(),
            self.event
        )
    }
}

impl std::error::Error for TransitionError {}

/// Apply an event, returning the next status.
pub fn apply(from: TxStatus, event: &TxEvent) -> Result<TxStatus, TransitionError> {
    use TxStatus::*;

    match (from, event) {
        (Pending | Failed, TxEvent::Resolved { .. }) => Ok(Mapped),
        // Replay of the same resolution is a silent no-op.
        (Mapped, TxEvent::Resolved { .. }) => Ok(Mapped),
        (Pending, TxEvent::ResolutionFailed) => Ok(Failed),
        // A re-run that fails again leaves the transaction failed.
        (Failed, TxEvent::ResolutionFailed) => Ok(Failed),
        (Mapped, TxEvent::ResolutionFailed) => Err(TransitionError {
            from,
            event: event.name().to_string(),
        }),
    }
}
