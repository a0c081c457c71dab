//! Per-depth counters and run totals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::canonical::StageCounts;
use crate::classify::Classified;

/// Counters for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub parents: u64,
    pub generated: u64,
    pub stages: StageCounts,
    pub cross_chunk_duplicates: u64,
    pub x_wins: u64,
    pub o_wins: u64,
    pub draws: u64,
    pub ongoing: u64,
}

impl ChunkStats {
    pub fn record_outcomes(&mut self, classified: &Classified) {
        self.x_wins = classified.x_wins.len() as u64;
        self.o_wins = classified.o_wins.len() as u64;
        self.draws = classified.draws.len() as u64;
        self.ongoing = classified.ongoing.len() as u64;
    }
}

/// Counters for one ply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthStats {
    /// Ply of the boards this depth produced
    pub ply: usize,
    pub frontier_in: u64,
    pub batches: u64,
    pub generated: u64,
    pub stages: StageCounts,
    pub cross_chunk_duplicates: u64,
    pub x_wins: u64,
    pub o_wins: u64,
    pub draws: u64,
    pub ongoing: u64,
    pub spilled_chunks: u64,
    pub elapsed_ms: u64,
}

impl DepthStats {
    pub fn new(ply: usize, frontier_in: u64) -> Self {
        DepthStats {
            ply,
            frontier_in,
            ..DepthStats::default()
        }
    }

    pub fn add_chunk(&mut self, chunk: &ChunkStats) {
        self.batches += 1;
        self.generated += chunk.generated;
        self.stages.accumulate(&chunk.stages);
        self.cross_chunk_duplicates += chunk.cross_chunk_duplicates;
        self.x_wins += chunk.x_wins;
        self.o_wins += chunk.o_wins;
        self.draws += chunk.draws;
        self.ongoing += chunk.ongoing;
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis() as u64;
    }

    /// Distinct canonical boards produced at this ply
    pub fn canonical(&self) -> u64 {
        self.stages.survivors() - self.cross_chunk_duplicates
    }

    pub fn terminals(&self) -> u64 {
        self.x_wins + self.o_wins + self.draws
    }

    /// Findings that point at a bad table, threshold or pipeline bug.
    pub fn consistency_findings(&self, early_exit_ply: usize) -> Vec<String> {
        let mut findings = Vec::new();
        if self.ply > early_exit_ply && self.frontier_in > 0 && self.terminals() == 0 {
            findings.push(format!(
                "ply {} is past the early-exit threshold {early_exit_ply} but produced no terminals",
                self.ply
            ));
        }
        if self.generated != self.stages.input {
            findings.push(format!(
                "ply {}: {} boards generated but {} entered the pipeline",
                self.ply, self.generated, self.stages.input
            ));
        }
        if self.terminals() + self.ongoing != self.canonical() {
            findings.push(format!(
                "ply {}: {} classified boards for {} canonical boards",
                self.ply,
                self.terminals() + self.ongoing,
                self.canonical()
            ));
        }
        findings
    }
}

/// Running totals, stored in the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub depths: u64,
    pub generated: u64,
    pub canonical: u64,
    pub x_wins: u64,
    pub o_wins: u64,
    pub draws: u64,
}

impl Totals {
    pub fn add(&mut self, depth: &DepthStats) {
        self.depths += 1;
        self.generated += depth.generated;
        self.canonical += depth.canonical();
        self.x_wins += depth.x_wins;
        self.o_wins += depth.o_wins;
        self.draws += depth.draws;
    }

    pub fn terminals(&self) -> u64 {
        self.x_wins + self.o_wins + self.draws
    }
}

/// Kernel dispatches and the wall time spent waiting on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceUsage {
    pub dispatches: u64,
    pub busy: Duration,
}

impl DeviceUsage {
    /// Share of `elapsed` spent in dispatches, as a percentage
    pub fn percent_of(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return 0.0;
        }
        100.0 * self.busy.as_secs_f64() / elapsed.as_secs_f64()
    }
}

/// What a finished run reports.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub backend: String,
    /// Depths processed by this invocation
    pub depths: Vec<DepthStats>,
    /// Totals including depths completed before a resume
    pub totals: Totals,
    /// Last ply completed before this invocation, when resumed
    pub resumed_after: Option<usize>,
    /// Ply of the last completed depth
    pub final_ply: usize,
    /// Ongoing boards left when the run stopped (non-zero when capped by max ply)
    pub open_frontier: u64,
    pub warnings: Vec<String>,
    /// Device time for this invocation; `None` on host-only backends
    pub device: Option<DeviceUsage>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_silent_depth_past_threshold() {
        let mut depth = DepthStats::new(6, 100);
        depth.add_chunk(&ChunkStats {
            parents: 100,
            generated: 2100,
            stages: StageCounts {
                input: 2100,
                removed_invalid: 0,
                removed_permutation: 1000,
                removed_rotation: 1000,
            },
            cross_chunk_duplicates: 0,
            ongoing: 100,
            ..ChunkStats::default()
        });
        let findings = depth.consistency_findings(4);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].contains("no terminals"));
        assert!(depth.consistency_findings(6).is_empty());
    }

    #[test]
    fn totals_accumulate() {
        let mut depth = DepthStats::new(5, 10);
        depth.generated = 20;
        depth.stages.input = 20;
        depth.x_wins = 2;
        depth.ongoing = 3;
        depth.stages.removed_rotation = 15;
        let mut totals = Totals::default();
        totals.add(&depth);
        assert_eq!(totals.canonical, 5);
        assert_eq!(totals.terminals(), 2);
        assert!(depth.consistency_findings(4).is_empty());
    }

    #[test]
    fn device_share_of_elapsed() {
        let usage = DeviceUsage {
            dispatches: 4,
            busy: Duration::from_millis(250),
        };
        assert!((usage.percent_of(Duration::from_secs(1)) - 25.0).abs() < 1e-9);
        assert_eq!(usage.percent_of(Duration::ZERO), 0.0);
    }
}
