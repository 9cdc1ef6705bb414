//! Stream offsets and offset-ledger windows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque stream position handed out by the remote service.
///
/// Offsets are compared for equality only. They carry no ordering, so this
/// type intentionally does not implement `PartialOrd`/`Ord`. The service
/// guarantees offsets are URL safe, but the client still encodes them.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(String);

impl Offset {
    /// Create an offset from its wire representation.
    ///
    /// Returns `None` for the empty string, which is reserved as the
    /// open-end sentinel of the ledger.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// The wire representation of this offset.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({})", self.0)
    }
}

/// A row of the offset ledger.
///
/// A window with no `to` bound is the *potential* window: the most recently
/// committed live offset, from which a gap is computed after a reconnect.
/// At most one exists. A window with a `to` bound is *pending*: a confirmed
/// gap that still has to be backfilled by replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplayWindow {
    /// Start of the window; advanced as replay makes progress.
    pub from: Offset,
    /// End of the window, or `None` for the potential window.
    pub to: Option<Offset>,
}

impl ReplayWindow {
    /// The open-ended window anchored at the latest live offset.
    pub fn potential(from: Offset) -> Self {
        Self { from, to: None }
    }

    /// A bounded window awaiting replay.
    pub fn pending(from: Offset, to: Offset) -> Self {
        Self { from, to: Some(to) }
    }

    /// Whether this window is a confirmed gap.
    pub fn is_pending(&self) -> bool {
        self.to.is_some()
    }

    /// The same window with its start moved to `offset`.
    ///
    /// The end bound never changes during replay.
    pub fn shrink_to(&self, offset: Offset) -> Self {
        Self {
            from: offset,
            to: self.to.clone(),
        }
    }

    /// The `to` bound as stored: empty for the potential window.
    pub fn to_str(&self) -> &str {
        self.to.as_ref().map(Offset::as_str).unwrap_or("")
    }
}

impl fmt::Display for ReplayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.to {
            Some(to) => write!(f, "[{} -> {}]", self.from, to),
            None => write!(f, "[{} -> ...]", self.from),
        }
    }
}
