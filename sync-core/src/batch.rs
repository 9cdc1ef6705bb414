//! Batch accumulation for the flusher.
//!
//! Measurements are collected until either the batch is full or the most
//! recent measurement carries an offset. An offset is a batch boundary set by
//! the producer: it is flushed right away so the ledger keeps advancing even
//! when throughput is low.

use sync_types::{Measurement, Offset};

/// A batch that is due to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    /// Measurements in receipt order.
    pub measurements: Vec<Measurement>,
    /// Offset of the measurement that triggered the flush, if any.
    pub offset: Option<Offset>,
}

/// Bounded accumulator of measurements.
#[derive(Debug)]
pub struct Batch {
    max_size: usize,
    items: Vec<Measurement>,
}

impl Batch {
    /// Create a batch holding at most `max_size` measurements (at least one).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            items: Vec::with_capacity(max_size),
        }
    }

    /// Add a measurement and return a flush if one is due.
    pub fn push(&mut self, measurement: Measurement) -> Option<Flush> {
        let offset = measurement.offset.clone();
        self.items.push(measurement);

        if offset.is_none() && self.items.len() < self.max_size {
            return None;
        }

        Some(Flush {
            measurements: self.take_remaining(),
            offset,
        })
    }

    /// Take whatever has accumulated, leaving the batch empty.
    pub fn take_remaining(&mut self) -> Vec<Measurement> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.max_size))
    }

    /// Number of measurements waiting.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Configured maximum size.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sync_types::MeasurementValue;

    fn make_measurement(secs: i64) -> Measurement {
        Measurement::new(
            "sensor",
            Utc.timestamp_opt(secs, 0).unwrap(),
            MeasurementValue::Numeric(secs as f64),
        )
    }

    fn offset(s: &str) -> Offset {
        Offset::new(s).unwrap()
    }

    #[test]
    fn flushes_when_full() {
        let mut batch = Batch::new(3);

        assert!(batch.push(make_measurement(1)).is_none());
        assert!(batch.push(make_measurement(2)).is_none());
        let flush = batch.push(make_measurement(3)).expect("batch is full");

        assert_eq!(flush.measurements.len(), 3);
        assert_eq!(flush.offset, None);
        assert!(batch.is_empty());
    }

    #[test]
    fn offset_forces_flush() {
        let mut batch = Batch::new(100);

        assert!(batch.push(make_measurement(1)).is_none());
        let flush = batch
            .push(make_measurement(2).with_offset(offset("o1")))
            .expect("offset triggers a flush");

        assert_eq!(flush.measurements.len(), 2);
        assert_eq!(flush.offset, Some(offset("o1")));
    }

    #[test]
    fn flush_preserves_receipt_order() {
        let mut batch = Batch::new(3);
        batch.push(make_measurement(3));
        batch.push(make_measurement(1));
        let flush = batch.push(make_measurement(2)).unwrap();

        let order: Vec<_> = flush
            .measurements
            .iter()
            .map(|m| m.timestamp.timestamp())
            .collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn take_remaining_drains_partial_batch() {
        let mut batch = Batch::new(10);
        batch.push(make_measurement(1));
        batch.push(make_measurement(2));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.take_remaining().len(), 2);
        assert!(batch.is_empty());
        assert!(batch.take_remaining().is_empty());
    }

    #[test]
    fn zero_size_is_treated_as_one() {
        let mut batch = Batch::new(0);
        assert_eq!(batch.max_size(), 1);
        assert!(batch.push(make_measurement(1)).is_some());
    }
}
