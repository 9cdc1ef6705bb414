//! Batch flushing of measurement streams.
//!
//! The flusher is the only writer of the measurement store and the offset
//! ledger. It drains a stream in receipt order, cuts it into batches with
//! [`sync_core::Batch`], and commits each batch together with the ledger
//! change its trailing offset implies.

use crate::error::SyncError;
use crate::storage::{LedgerUpdate, SyncStorage};
use futures_util::StreamExt;
use std::sync::Arc;
use sync_client::MeasurementStream;
use sync_core::{Batch, Flush};
use sync_types::ReplayWindow;

/// Commits measurement streams to storage.
pub struct BatchFlusher {
    storage: Arc<dyn SyncStorage>,
    batch_size: usize,
    replay_enabled: bool,
}

impl BatchFlusher {
    /// Create a flusher.
    ///
    /// Live offsets are only recorded in the ledger when `replay_enabled`.
    pub fn new(storage: Arc<dyn SyncStorage>, batch_size: usize, replay_enabled: bool) -> Self {
        Self {
            storage,
            batch_size,
            replay_enabled,
        }
    }

    /// Drain a live stream.
    ///
    /// `offset_seen` tells whether this live task has already committed an
    /// offset; the updated flag is returned when the stream ends. The first
    /// offset of a task marks a reconnect, so the ledger records the gap
    /// since the previous anchor.
    ///
    /// On a stream error the unflushed tail is dropped: it lies after the
    /// last committed offset and will be replayed.
    pub async fn flush_live(
        &self,
        mut stream: MeasurementStream,
        mut offset_seen: bool,
    ) -> Result<bool, SyncError> {
        let mut batch = Batch::new(self.batch_size);

        while let Some(item) = stream.next().await {
            let Some(Flush {
                measurements,
                offset,
            }) = batch.push(item?)
            else {
                continue;
            };

            let update = match offset {
                Some(offset) if self.replay_enabled => LedgerUpdate::Live {
                    offset,
                    first_since_restart: !offset_seen,
                },
                _ => LedgerUpdate::None,
            };
            let tracks_offset = update != LedgerUpdate::None;

            self.storage.commit(&measurements, update).await?;
            tracing::debug!("Flushed {} live measurements", measurements.len());
            offset_seen |= tracks_offset;
        }

        let remaining = batch.take_remaining();
        if !remaining.is_empty() {
            self.storage.commit(&remaining, LedgerUpdate::None).await?;
            tracing::debug!("Flushed {} live measurements at end of stream", remaining.len());
        }
        Ok(offset_seen)
    }

    /// Drain a replay stream for `window`.
    ///
    /// Each committed offset moves the window's start forward. When the
    /// stream completes, the remainder is committed and the window deleted
    /// in one transaction.
    pub async fn flush_replay(
        &self,
        mut stream: MeasurementStream,
        mut window: ReplayWindow,
    ) -> Result<(), SyncError> {
        let mut batch = Batch::new(self.batch_size);

        while let Some(item) = stream.next().await {
            let Some(Flush {
                measurements,
                offset,
            }) = batch.push(item?)
            else {
                continue;
            };

            match offset {
                Some(offset) => {
                    let update = LedgerUpdate::ReplayProgress {
                        window: window.clone(),
                        offset: offset.clone(),
                    };
                    self.storage.commit(&measurements, update).await?;
                    window = window.shrink_to(offset);
                }
                None => {
                    self.storage
                        .commit(&measurements, LedgerUpdate::None)
                        .await?;
                }
            }
            tracing::debug!(
                "Flushed {} replayed measurements, window now {}",
                measurements.len(),
                window
            );
        }

        let remaining = batch.take_remaining();
        let count = remaining.len();
        self.storage
            .commit(
                &remaining,
                LedgerUpdate::ReplayCompleted {
                    window: window.clone(),
                },
            )
            .await?;
        tracing::debug!(
            "Replay of {} completed with {} trailing measurements",
            window,
            count
        );
        Ok(())
    }
}
