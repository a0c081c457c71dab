//! # Canonicalization Pipeline
//!
//! Three stages, always in this order, each a pure batch-to-batch function:
//!
//! 1. validity filter: drop sequences that play a cell twice
//! 2. permutation collapse: one survivor per occupancy signature
//! 3. rotation collapse: one survivor per rotation-orbit minimum
//!
//! Each stage keeps the first member of a group in batch order. Only the key
//! is fixed by the math; which sequence represents it follows from the order
//! expansion produced.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::ComputeBackend;
use crate::board::{MoveSequence, PackedBoard};
use crate::dedup::ShardedFirstSeen;
use crate::error::Result;
use crate::tables::RotationTable;

/// A survivor of all three stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonical {
    /// Representative sequence that reached this class first
    pub sequence: MoveSequence,
    /// Occupancy signature of `sequence`
    pub code: PackedBoard,
    /// Orbit minimum of `code` over the rotation group
    pub key: PackedBoard,
}

/// Boards seen and removed at each stage of one pipeline pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub input: u64,
    pub removed_invalid: u64,
    pub removed_permutation: u64,
    pub removed_rotation: u64,
}

impl StageCounts {
    pub fn survivors(&self) -> u64 {
        self.input - self.removed_invalid - self.removed_permutation - self.removed_rotation
    }

    pub fn accumulate(&mut self, other: &StageCounts) {
        self.input += other.input;
        self.removed_invalid += other.removed_invalid;
        self.removed_permutation += other.removed_permutation;
        self.removed_rotation += other.removed_rotation;
    }
}

pub fn validity_filter(batch: Vec<MoveSequence>) -> Vec<MoveSequence> {
    batch.into_par_iter().filter(MoveSequence::is_valid).collect()
}

/// Host-side permutation collapse, signatures computed here.
pub fn permutation_collapse(batch: Vec<MoveSequence>) -> Vec<(MoveSequence, PackedBoard)> {
    let signatures: Vec<PackedBoard> = batch.par_iter().map(MoveSequence::signature).collect();
    collapse_signatures(batch, signatures)
}

/// Permutation collapse given precomputed signatures (`signatures[i]` belongs to `batch[i]`).
pub fn collapse_signatures(
    batch: Vec<MoveSequence>,
    signatures: Vec<PackedBoard>,
) -> Vec<(MoveSequence, PackedBoard)> {
    let keys: Vec<u64> = signatures.iter().map(|s| s.raw()).collect();
    let paired: Vec<(MoveSequence, PackedBoard)> = batch.into_iter().zip(signatures).collect();
    keep_first_seen(paired, &keys)
}

/// Rotation collapse given each board's orbit key (`keys[i]` belongs to `batch[i]`).
pub fn rotation_collapse(batch: Vec<(MoveSequence, PackedBoard)>, keys: &[u64]) -> Vec<Canonical> {
    let tagged: Vec<Canonical> = batch
        .into_iter()
        .zip(keys)
        .map(|((sequence, code), &key)| Canonical {
            sequence,
            code,
            key: PackedBoard::from_raw_unchecked(key),
        })
        .collect();
    keep_first_seen(tagged, keys)
}

/// Host-side orbit keys.
pub fn rotation_keys(rotations: &RotationTable, codes: &[PackedBoard]) -> Vec<u64> {
    codes.par_iter().map(|c| rotations.canonical_key(c.raw())).collect()
}

fn keep_first_seen<T>(items: Vec<T>, keys: &[u64]) -> Vec<T> {
    debug_assert_eq!(items.len(), keys.len());
    let seen = ShardedFirstSeen::new();
    seen.offer_all(keys);
    let survivors = seen.into_survivors();
    let mut next = survivors.iter().copied().peekable();
    let mut kept = Vec::with_capacity(survivors.len());
    for (i, item) in items.into_iter().enumerate() {
        if next.peek() == Some(&i) {
            kept.push(item);
            next.next();
        }
    }
    kept
}

/// Survivors of one pass plus per-stage counts
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub survivors: Vec<Canonical>,
    pub counts: StageCounts,
}

/// Runs the three stages with signature and rotation work on a backend.
pub struct Pipeline<'a> {
    backend: &'a dyn ComputeBackend,
}

impl<'a> Pipeline<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        Pipeline { backend }
    }

    pub fn canonicalize(&self, batch: Vec<MoveSequence>) -> Result<PipelineOutput> {
        let mut counts = StageCounts {
            input: batch.len() as u64,
            ..StageCounts::default()
        };
        if batch.is_empty() {
            return Ok(PipelineOutput::default());
        }

        let valid = validity_filter(batch);
        counts.removed_invalid = counts.input - valid.len() as u64;
        if valid.is_empty() {
            return Ok(PipelineOutput {
                survivors: Vec::new(),
                counts,
            });
        }

        let signatures = self.backend.signatures(&valid)?;
        let before = valid.len();
        let distinct = collapse_signatures(valid, signatures);
        counts.removed_permutation = (before - distinct.len()) as u64;

        let codes: Vec<PackedBoard> = distinct.iter().map(|&(_, code)| code).collect();
        let keys = self.backend.rotation_keys(&codes)?;
        let before = distinct.len();
        let survivors = rotation_collapse(distinct, &keys);
        counts.removed_rotation = (before - survivors.len()) as u64;

        log::trace!(
            "canonicalized {} -> {} ({} invalid, {} permutation, {} rotation)",
            counts.input,
            survivors.len(),
            counts.removed_invalid,
            counts.removed_permutation,
            counts.removed_rotation
        );
        Ok(PipelineOutput { survivors, counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(texts: &[&str]) -> Vec<MoveSequence> {
        texts.iter().map(|t| MoveSequence::parse(t).unwrap()).collect()
    }

    #[test]
    fn validity_drops_repeated_cells() {
        let kept = validity_filter(seqs(&["AAB", "ABC", "Aa"]));
        assert_eq!(kept, seqs(&["ABC"]));
    }

    #[test]
    fn permutation_collapse_keeps_first() {
        let kept = permutation_collapse(seqs(&["ABC", "BCA", "AbC", "CbA"]));
        let names: Vec<String> = kept.iter().map(|(s, _)| s.to_string()).collect();
        assert_eq!(names, vec!["ABC", "AbC"]);
    }

    #[test]
    fn rotation_collapse_uses_orbit_minimum() {
        let table = RotationTable::generate();
        // Corner X at cells 0 and 26 lie in the same orbit.
        let batch = permutation_collapse(seqs(&["Z", "A", "."]));
        let codes: Vec<PackedBoard> = batch.iter().map(|&(_, c)| c).collect();
        let keys = rotation_keys(&table, &codes);
        let kept = rotation_collapse(batch, &keys);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].sequence.to_string(), "Z");
        assert_eq!(kept[1].sequence.to_string(), "A");
        assert_eq!(kept[1].key.raw(), 1);
    }
}
