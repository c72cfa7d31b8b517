//! Structure of Arrays (`SoA`) storage for decoded signals.
//!
//! `SignalBatch` keeps one column per field so the sorter can permute rows
//! and the clusterer can scan coordinates and timestamps without touching
//! unrelated data.

use crate::error::{Error, Result};
use crate::signal::{SignalRecord, SignalType};
use serde::{Deserialize, Serialize};

/// A batch of signals stored in Structure of Arrays (`SoA`) format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBatch {
    /// Packet category per row.
    pub signal_type: Vec<SignalType>,
    /// Global X coordinate (pixel hits only).
    pub x: Vec<u16>,
    /// Global Y coordinate (pixel hits only).
    pub y: Vec<u16>,
    /// Time of arrival in seconds.
    pub toa: Vec<f64>,
    /// Time over threshold in nanoseconds.
    pub tot: Vec<f64>,
    /// 1-based chunk number.
    pub buffer: Vec<u32>,
    /// Chip id from the chunk header.
    pub chip: Vec<u8>,
    /// Cluster assignments (output of clustering).
    pub group_id: Vec<i32>,
}

impl SignalBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            signal_type: Vec::with_capacity(capacity),
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            toa: Vec::with_capacity(capacity),
            tot: Vec::with_capacity(capacity),
            buffer: Vec::with_capacity(capacity),
            chip: Vec::with_capacity(capacity),
            group_id: Vec::with_capacity(capacity),
        }
    }

    /// Builds a batch from records.
    #[must_use]
    pub fn from_records(records: &[SignalRecord]) -> Self {
        let mut batch = Self::with_capacity(records.len());
        for record in records {
            batch.push(record);
        }
        batch
    }

    /// Returns the number of signals in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.toa.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.toa.is_empty()
    }

    /// Appends all signals from another batch to this one.
    pub fn append(&mut self, other: &SignalBatch) {
        self.signal_type.extend_from_slice(&other.signal_type);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.toa.extend_from_slice(&other.toa);
        self.tot.extend_from_slice(&other.tot);
        self.buffer.extend_from_slice(&other.buffer);
        self.chip.extend_from_slice(&other.chip);
        self.group_id.extend_from_slice(&other.group_id);
    }

    /// Pushes a single record into the batch.
    pub fn push(&mut self, record: &SignalRecord) {
        self.signal_type.push(record.signal_type);
        self.x.push(record.x);
        self.y.push(record.y);
        self.toa.push(record.toa);
        self.tot.push(record.tot);
        self.buffer.push(record.buffer);
        self.chip.push(record.chip);
        self.group_id.push(record.group_id);
    }

    /// Returns row `index` as a record.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<SignalRecord> {
        Some(SignalRecord {
            signal_type: *self.signal_type.get(index)?,
            x: *self.x.get(index)?,
            y: *self.y.get(index)?,
            toa: *self.toa.get(index)?,
            tot: *self.tot.get(index)?,
            buffer: *self.buffer.get(index)?,
            chip: *self.chip.get(index)?,
            group_id: *self.group_id.get(index)?,
        })
    }

    /// Iterates over rows as records.
    pub fn records(&self) -> impl Iterator<Item = SignalRecord> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Checks that every column has the same length.
    ///
    /// # Errors
    /// Returns [`Error::ColumnMismatch`] naming the first column that disagrees
    /// with `toa`.
    pub fn check_columns(&self) -> Result<()> {
        let expected = self.len();
        for found in [
            self.signal_type.len(),
            self.x.len(),
            self.y.len(),
            self.tot.len(),
            self.buffer.len(),
            self.chip.len(),
            self.group_id.len(),
        ] {
            if found != expected {
                return Err(Error::ColumnMismatch { expected, found });
            }
        }
        Ok(())
    }

    /// Number of pixel hits in the batch.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.signal_type
            .iter()
            .filter(|&&ty| ty == SignalType::PixelHit)
            .count()
    }

    /// True when `toa` is non-decreasing under `f64::total_cmp`.
    #[must_use]
    pub fn is_time_sorted(&self) -> bool {
        self.toa.windows(2).all(|w| w[0].total_cmp(&w[1]).is_le())
    }

    /// Reorders every column so that new row `i` is old row `order[i]`.
    ///
    /// # Errors
    /// Returns [`Error::ColumnMismatch`] if `order` does not cover the batch.
    pub fn permute(&mut self, order: &[usize]) -> Result<()> {
        if order.len() != self.len() {
            return Err(Error::ColumnMismatch {
                expected: self.len(),
                found: order.len(),
            });
        }
        self.signal_type = gather(&self.signal_type, order);
        self.x = gather(&self.x, order);
        self.y = gather(&self.y, order);
        self.toa = gather(&self.toa, order);
        self.tot = gather(&self.tot, order);
        self.buffer = gather(&self.buffer, order);
        self.chip = gather(&self.chip, order);
        self.group_id = gather(&self.group_id, order);
        Ok(())
    }
}

fn gather<T: Copy>(column: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&i| column[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{NOT_CLUSTERABLE, UNCLUSTERED};

    #[test]
    fn test_signal_batch_operations() {
        let mut batch = SignalBatch::with_capacity(10);
        assert!(batch.is_empty());

        batch.push(&SignalRecord::pixel(10, 20, 1.0e-6, 50.0));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.x[0], 10);
        assert_eq!(batch.group_id[0], UNCLUSTERED);

        batch.push(&SignalRecord::timing(SignalType::Tdc, 2.0e-6, 0.0));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.group_id[1], NOT_CLUSTERABLE);
        assert_eq!(batch.pixel_count(), 1);
        assert!(batch.check_columns().is_ok());
    }

    #[test]
    fn test_permute_moves_whole_rows() {
        let mut batch = SignalBatch::from_records(&[
            SignalRecord::pixel(1, 1, 3.0, 10.0),
            SignalRecord::timing(SignalType::Tdc, 1.0, 0.0),
            SignalRecord::pixel(2, 2, 2.0, 20.0),
        ]);
        assert!(!batch.is_time_sorted());

        batch.permute(&[1, 2, 0]).unwrap();
        assert!(batch.is_time_sorted());
        assert_eq!(batch.signal_type[0], SignalType::Tdc);
        assert_eq!((batch.x[1], batch.tot[1]), (2, 20.0));
        assert_eq!((batch.x[2], batch.tot[2]), (1, 10.0));

        assert!(batch.permute(&[0]).is_err());
    }
}
