//! Offset-ledger planning.
//!
//! The ledger holds one *potential* window (open end, anchored at the latest
//! committed live offset) and any number of *pending* windows (confirmed gaps
//! awaiting replay). These functions decide how an observed offset changes the
//! ledger and return the changes as [`LedgerOp`]s. The storage layer applies
//! them inside the same transaction as the measurements they belong to.
//!
//! Offsets are opaque: they are only ever compared for equality.

use sync_types::{Offset, ReplayWindow};

/// A single change to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    /// Add a window.
    Insert(ReplayWindow),
    /// Remove a window.
    Delete(ReplayWindow),
}

/// Plan the ledger change for an offset observed on the live stream.
///
/// - No potential window yet: this is the first offset ever seen, so anchor
///   a potential window at it. There is nothing to replay.
/// - First offset since this live task started: the stream was interrupted
///   somewhere after the old anchor, so record the gap `(old anchor, offset)`
///   as pending and re-anchor at `offset`.
/// - Otherwise the connection was continuous since the anchor: just re-anchor.
///
/// An offset equal to the current anchor changes nothing.
pub fn plan_live_offset(
    potential: Option<&ReplayWindow>,
    offset: &Offset,
    first_since_restart: bool,
) -> Vec<LedgerOp> {
    let Some(potential) = potential else {
        return vec![LedgerOp::Insert(ReplayWindow::potential(offset.clone()))];
    };
    debug_assert!(!potential.is_pending(), "potential window has an end bound");

    if potential.from == *offset {
        return Vec::new();
    }

    let mut ops = vec![LedgerOp::Delete(potential.clone())];
    if first_since_restart {
        ops.push(LedgerOp::Insert(ReplayWindow::pending(
            potential.from.clone(),
            offset.clone(),
        )));
    }
    ops.push(LedgerOp::Insert(ReplayWindow::potential(offset.clone())));
    ops
}

/// Plan the ledger change for an offset observed while replaying `window`.
///
/// Returns the window as it stands afterwards: its start moves to `offset`
/// so progress survives an aborted replay. The end bound never changes.
pub fn plan_replay_progress(window: &ReplayWindow, offset: &Offset) -> (ReplayWindow, Vec<LedgerOp>) {
    if window.from == *offset {
        return (window.clone(), Vec::new());
    }

    let shrunk = window.shrink_to(offset.clone());
    let ops = vec![
        LedgerOp::Delete(window.clone()),
        LedgerOp::Insert(shrunk.clone()),
    ];
    (shrunk, ops)
}

/// Plan the ledger change once the server reports `window` fully replayed.
pub fn plan_replay_completed(window: &ReplayWindow) -> Vec<LedgerOp> {
    vec![LedgerOp::Delete(window.clone())]
}
