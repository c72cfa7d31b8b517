//! Time-ordering of decoded signals.
//!
//! # Problem
//! Packets inside one chunk are roughly time ordered, but chunks from the
//! readout are not ordered relative to each other, and clustering needs a
//! single sequence with non-decreasing ToA.
//!
//! # Solution
//! Two interchangeable strategies that produce the same permutation:
//! 1. `Global`: one stable parallel sort of row indices by ToA.
//! 2. `BufferMerge`: stable sort inside each chunk, then a min-heap k-way
//!    merge across chunks. Ties go to the earlier chunk, which matches the
//!    global sort because chunks are contiguous and in file order.
//!
//! ToA is compared with `f64::total_cmp`, so NaN values sort last and the
//! order is total. Sorting already-sorted input returns the identity.

use crate::decoder::chunk_ranges;
use crate::error::Result;
use hermes_core::{SignalBatch, SortStrategy};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

/// Stable time order of all rows.
#[must_use]
pub fn time_order_global(toa: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..toa.len()).collect();
    order.par_sort_by(|&a, &b| toa[a].total_cmp(&toa[b]));
    order
}

/// Stable time order built by merging per-chunk orders.
#[must_use]
pub fn time_order_merged(toa: &[f64], chunks: &[Range<usize>]) -> Vec<usize> {
    BufferMerge::new(toa, chunks).collect()
}

/// Head of one chunk inside the merge heap.
#[derive(Debug, Clone, Copy)]
struct MergeCursor {
    toa: f64,
    chunk: usize,
    pos: usize,
}

// Reverse ordering for Min-Heap (earliest ToA, then earliest chunk, first)
impl Ord for MergeCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .toa
            .total_cmp(&self.toa)
            .then_with(|| other.chunk.cmp(&self.chunk))
    }
}

impl PartialOrd for MergeCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeCursor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCursor {}

/// Iterator yielding row indices in global time order by merging chunks.
pub struct BufferMerge<'a> {
    toa: &'a [f64],
    per_chunk: Vec<Vec<usize>>,
    heap: BinaryHeap<MergeCursor>,
}

impl<'a> BufferMerge<'a> {
    /// Sorts each chunk (in parallel) and seeds the heap with their heads.
    #[must_use]
    pub fn new(toa: &'a [f64], chunks: &[Range<usize>]) -> Self {
        let per_chunk: Vec<Vec<usize>> = chunks
            .par_iter()
            .map(|range| {
                let mut rows: Vec<usize> = range.clone().collect();
                rows.sort_by(|&a, &b| toa[a].total_cmp(&toa[b]));
                rows
            })
            .collect();

        let heap = per_chunk
            .iter()
            .enumerate()
            .filter_map(|(chunk, rows)| {
                rows.first().map(|&row| MergeCursor {
                    toa: toa[row],
                    chunk,
                    pos: 0,
                })
            })
            .collect();

        Self {
            toa,
            per_chunk,
            heap,
        }
    }
}

impl Iterator for BufferMerge<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let head = self.heap.pop()?;
        let rows = &self.per_chunk[head.chunk];
        if let Some(&next_row) = rows.get(head.pos + 1) {
            self.heap.push(MergeCursor {
                toa: self.toa[next_row],
                chunk: head.chunk,
                pos: head.pos + 1,
            });
        }
        Some(rows[head.pos])
    }
}

/// Sorts `batch` in place by ToA.
///
/// `chunk_starts` are the first rows of each decoded chunk; they are only
/// used by [`SortStrategy::BufferMerge`]. Rows outside any chunk range are
/// treated as one trailing chunk.
///
/// # Errors
/// Returns an error if the permutation does not cover the batch.
pub fn sort_signals(
    batch: &mut SignalBatch,
    chunk_starts: &[usize],
    strategy: SortStrategy,
) -> Result<()> {
    if batch.is_time_sorted() {
        return Ok(());
    }
    let order = match strategy {
        SortStrategy::Global => time_order_global(&batch.toa),
        SortStrategy::BufferMerge => {
            let mut starts = chunk_starts.to_vec();
            if starts.first() != Some(&0) {
                starts.insert(0, 0);
            }
            time_order_merged(&batch.toa, &chunk_ranges(&starts, batch.len()))
        }
    };
    batch.permute(&order)?;
    Ok(())
}
