//! # sync-daemon
//!
//! Keeps a local SQLite database in sync with the measurement API.
//!
//! This crate implements a daemon that:
//! - Streams new measurements from the live endpoint
//! - Detects gaps caused by disconnects and records them in an offset ledger
//! - Backfills gaps from the replay endpoint, one window at a time
//! - Upserts everything by `(sensor_id, timestamp)`, so redelivery is harmless
//!
//! ## Architecture
//!
//! ```text
//!   fetch loop (one tick per interval, backoff on retriable errors)
//!        │
//!        ▼
//!   SyncEngine ──┬── live task ───┐
//!                └── replay task ─┤   MeasurementSource (HTTP)
//!                                 ▼
//!                           BatchFlusher
//!                                 │  one transaction per batch
//!                                 ▼
//!                  ┌──────────────────────────────┐
//!                  │ SQLite: measurement, replay  │
//!                  └──────────────────────────────┘
//! ```
//!
//! ## Offset ledger
//!
//! The `replay` table holds one potential window `(latest offset, '')` and
//! any number of pending windows `(from, to)`. A live task that reconnects
//! turns the potential window into a pending one when it sees its first
//! offset; the replay task shrinks and finally deletes pending windows.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod flusher;
pub mod storage;
pub mod timer;
