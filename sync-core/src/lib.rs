//! # sync-core
//!
//! Pure logic for measync (no I/O, instant tests).
//!
//! This crate implements the algorithms of the synchronizer without any
//! network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`Batch`] decides when a flush is due
//! - [`plan_live_offset`] and friends turn an observed offset into ledger
//!   operations ([`LedgerOp`])
//! - [`BackoffPolicy`] decides how long to sleep between ticks
//!
//! The actual I/O (HTTP streaming, SQLite transactions) is performed by
//! `sync-client` and `sync-daemon`, which execute the plans produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod batch;
pub mod ledger;

pub use backoff::BackoffPolicy;
pub use batch::{Batch, Flush};
pub use ledger::{plan_live_offset, plan_replay_completed, plan_replay_progress, LedgerOp};
