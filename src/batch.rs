//! Batch sizing against host and device memory ceilings.

use crate::backend::BackendLimits;
use crate::error::{Error, Result};
use crate::expansion::EXPANSION_FACTOR;

/// Bytes one expanded board occupies on the device: 8 u32 words, seven of
/// symbol bytes and one holding the ply.
pub const BYTES_PER_BOARD: u64 = 32;

/// Frontier boards per batch, fixed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    effective_budget: u64,
    boards_per_batch: usize,
}

impl BatchPlan {
    /// Sizes a batch so its worst-case expansion fits every ceiling.
    pub fn new(host_budget: u64, device_budget: u64, limits: BackendLimits) -> Result<Self> {
        let effective = host_budget
            .min(device_budget)
            .min(limits.max_buffer_bytes)
            .min(limits.memory_budget_bytes);
        let per_parent = EXPANSION_FACTOR as u64 * BYTES_PER_BOARD;
        let boards = effective / per_parent;
        if boards == 0 {
            return Err(Error::Budget {
                message: format!(
                    "{effective} bytes cannot hold the {per_parent}-byte expansion of one board"
                ),
            });
        }
        Ok(BatchPlan {
            effective_budget: effective,
            boards_per_batch: usize::try_from(boards).unwrap_or(usize::MAX),
        })
    }

    pub fn boards_per_batch(&self) -> usize {
        self.boards_per_batch
    }

    pub fn effective_budget(&self) -> u64 {
        self.effective_budget
    }

    /// Batches needed for `frontier_len` boards
    pub fn chunk_count(&self, frontier_len: usize) -> usize {
        frontier_len.div_ceil(self.boards_per_batch)
    }

    /// Splits a loaded frontier chunk into planned batches.
    pub fn batches<'a, T>(&self, boards: &'a [T]) -> std::slice::Chunks<'a, T> {
        boards.chunks(self.boards_per_batch)
    }
}
