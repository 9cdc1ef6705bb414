//! # sync-types
//!
//! Wire format and data model types for measync.
//!
//! This crate provides the foundational types used across all measync crates:
//! - [`Offset`] - Opaque stream cursor handed out by the remote service
//! - [`Measurement`], [`MeasurementValue`] - One sensor reading
//! - [`ReplayWindow`] - A row of the offset ledger (potential or pending)
//! - [`Frame`], [`ControlRecord`], [`decode_line`] - Newline-delimited JSON decoding
//! - [`WireError`] - Decoding errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod measurement;
mod offset;
mod wire;

pub use error::WireError;
pub use measurement::{Measurement, MeasurementValue};
pub use offset::{Offset, ReplayWindow};
pub use wire::{decode_line, ControlRecord, Frame, StreamKind};
