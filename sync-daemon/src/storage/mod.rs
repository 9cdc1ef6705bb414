//! Storage layer for sync-daemon.
//!
//! Holds the measurement store and the offset ledger. Both live in the same
//! database so a batch of measurements and the ledger change it implies are
//! committed in one transaction.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageResult;
use async_trait::async_trait;
use sync_types::{Measurement, Offset, ReplayWindow};

/// Ledger change committed together with a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// Measurements only.
    None,
    /// An offset seen on the live stream.
    Live {
        /// The offset.
        offset: Offset,
        /// Whether it is the first offset the current live task has seen.
        first_since_restart: bool,
    },
    /// An offset seen while replaying `window`.
    ReplayProgress {
        /// The window as currently stored.
        window: ReplayWindow,
        /// The offset.
        offset: Offset,
    },
    /// The server finished replaying `window`.
    ReplayCompleted {
        /// The window as currently stored.
        window: ReplayWindow,
    },
}

/// Trait for the transactional persistence boundary.
#[async_trait]
pub trait SyncStorage: Send + Sync {
    /// Upsert `measurements` and apply `update`, atomically.
    ///
    /// Either everything is committed or nothing is.
    async fn commit(&self, measurements: &[Measurement], update: LedgerUpdate)
        -> StorageResult<()>;

    /// Delete one ledger window. Fails unless exactly that window existed.
    async fn delete_window(&self, window: &ReplayWindow) -> StorageResult<()>;

    /// The potential window, if any offset has ever been seen.
    async fn potential_window(&self) -> StorageResult<Option<ReplayWindow>>;

    /// All pending windows in insertion order.
    async fn pending_windows(&self) -> StorageResult<Vec<ReplayWindow>>;

    /// The pending window to replay next.
    async fn first_pending_window(&self) -> StorageResult<Option<ReplayWindow>>;

    /// Anchor of the potential window.
    async fn latest_offset(&self) -> StorageResult<Option<Offset>> {
        Ok(self.potential_window().await?.map(|w| w.from))
    }

    /// Number of stored measurements.
    async fn measurement_count(&self) -> StorageResult<u64>;

    /// Stored measurements of one sensor, oldest first.
    async fn measurements(&self, sensor_id: &str) -> StorageResult<Vec<Measurement>>;
}
