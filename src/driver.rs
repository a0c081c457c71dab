//! # Depth Driver
//!
//! Breadth-first traversal, one ply at a time:
//!
//! ```text
//! Seed -> { Expand -> Canonicalize -> cross-batch dedup -> Classify -> store / next frontier }* -> Done
//! ```
//!
//! Each depth reads the current frontier chunk by chunk in planned batches,
//! appends terminal records to the store and hands ongoing boards to a
//! [`FrontierWriter`] for the next ply. The next frontier is persisted and a
//! checkpoint written before the previous frontier is deleted, so a failed
//! run can pick up from the last completed depth.

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::{self, ComputeBackend};
use crate::batch::BatchPlan;
use crate::board::{MoveSequence, PackedBoard};
use crate::canonical::{Canonical, Pipeline};
use crate::checkpoint::Checkpoint;
use crate::classify::{Classified, Classifier};
use crate::config::RunConfig;
use crate::dedup::ShardedKeySet;
use crate::error::{Error, Result};
use crate::frontier::{depth_dir, Frontier, FrontierWriter};
use crate::stats::{ChunkStats, DepthStats, RunSummary, Totals};
use crate::store::{TerminalRecord, TerminalStore};
use crate::tables::{ConstantTables, RotationTable, WinLineTable};

/// Loads the configured tables, falling back to the built-in ones per table.
pub fn load_tables(config: &RunConfig) -> Result<ConstantTables> {
    let rotations = match &config.rotation_table {
        Some(path) => RotationTable::load(path)?,
        None => RotationTable::generate(),
    };
    let win_lines = match &config.win_line_table {
        Some(path) => WinLineTable::load(path)?,
        None => WinLineTable::generate(),
    };
    Ok(ConstantTables { rotations, win_lines })
}

/// Owns the backend, the worker pool and the batch plan for one run.
pub struct Enumerator {
    config: RunConfig,
    backend: Box<dyn ComputeBackend>,
    classifier: Classifier,
    plan: BatchPlan,
    pool: ThreadPool,
}

impl Enumerator {
    /// Validates `config` and sizes batches from the backend's limits.
    pub fn new(config: RunConfig, backend: Box<dyn ComputeBackend>) -> Result<Self> {
        config.validate()?;
        let plan = BatchPlan::new(
            config.host_budget_bytes,
            config.device_budget_bytes,
            backend.limits(),
        )?;

        let pool_builder = ThreadPoolBuilder::new();
        let pool = if config.threads > 0 {
            pool_builder.num_threads(config.threads).build()
        } else {
            pool_builder.build()
        }
        .map_err(|e| Error::config(format!("cannot start worker pool: {e}")))?;

        Ok(Enumerator {
            classifier: Classifier::new(config.early_exit_ply),
            config,
            backend,
            plan,
            pool,
        })
    }

    /// Loads tables and picks the backend named in `config`.
    pub fn from_config(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let tables = Arc::new(load_tables(&config)?);
        log::info!(
            "loaded {} rotations and {} win lines",
            tables.rotations.len(),
            tables.win_lines.len()
        );
        let backend = backend::select(config.backend, tables)?;
        Self::new(config, backend)
    }

    pub fn plan(&self) -> BatchPlan {
        self.plan
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let output = &self.config.output_dir;
        fs::create_dir_all(output).map_err(|e| Error::io("create output directory", output, e))?;

        let (mut frontier, mut store, mut totals, resumed_after) = if self.config.resume {
            self.resume_state()?
        } else {
            self.fresh_state()?
        };

        log::info!(
            "backend {}: {} boards per batch ({} MiB effective budget)",
            self.backend.name(),
            self.plan.boards_per_batch(),
            self.plan.effective_budget() / (1024 * 1024)
        );

        let mut depths = Vec::new();
        let mut warnings = Vec::new();
        while !frontier.is_empty() && frontier.ply() < self.config.max_ply {
            let (stats, next) = self.run_depth(&frontier, &mut store)?;

            for finding in stats.consistency_findings(self.config.early_exit_ply) {
                if self.config.strict {
                    return Err(Error::Consistency { message: finding });
                }
                log::warn!("{finding}");
                warnings.push(finding);
            }

            totals.add(&stats);
            store.flush()?;
            self.write_checkpoint(&next, &store, totals)?;
            if !self.config.keep_frontier {
                frontier.release()?;
            }
            depths.push(stats);
            frontier = next;
        }

        let final_ply = frontier.ply();
        let open_frontier = frontier.len() as u64;
        if open_frontier == 0 {
            log::info!("frontier exhausted at ply {final_ply}");
            if !self.config.keep_frontier {
                frontier.release()?;
            }
        } else {
            log::info!(
                "stopped at max ply {} with {open_frontier} ongoing boards left",
                self.config.max_ply
            );
        }

        Ok(RunSummary {
            backend: self.backend.name().to_string(),
            final_ply,
            open_frontier,
            depths,
            totals,
            resumed_after,
            warnings,
            device: self.backend.device_usage(),
            elapsed: started.elapsed(),
        })
    }

    fn fresh_state(&self) -> Result<(Frontier, TerminalStore, Totals, Option<usize>)> {
        let root = self.config.frontier_root();
        if root.exists() {
            fs::remove_dir_all(&root).map_err(|e| Error::io("clear frontier directory", &root, e))?;
        }
        let checkpoint = self.config.checkpoint_path();
        if checkpoint.exists() {
            fs::remove_file(&checkpoint).map_err(|e| Error::io("remove stale checkpoint", &checkpoint, e))?;
        }
        let text = self.config.terminals_text_path();
        let store = TerminalStore::create(
            &self.config.terminals_path(),
            self.config.write_text.then_some(text.as_path()),
        )?;
        Ok((Frontier::seed(), store, Totals::default(), None))
    }

    fn resume_state(&self) -> Result<(Frontier, TerminalStore, Totals, Option<usize>)> {
        let checkpoint = Checkpoint::load(&self.config.checkpoint_path())?;
        if checkpoint.text_bytes.is_some() != self.config.write_text {
            return Err(Error::config(
                "text mirror setting differs from the run being resumed",
            ));
        }
        let frontier = Frontier::open(&self.config.frontier_root(), checkpoint.completed_ply)?;
        if frontier.len() as u64 != checkpoint.frontier_len {
            return Err(Error::Consistency {
                message: format!(
                    "checkpoint records {} frontier boards at ply {}, found {}",
                    checkpoint.frontier_len,
                    checkpoint.completed_ply,
                    frontier.len()
                ),
            });
        }
        let text = self.config.terminals_text_path();
        let store = TerminalStore::reopen(
            &self.config.terminals_path(),
            checkpoint.terminals_bytes,
            checkpoint.text_bytes.map(|len| (text.as_path(), len)),
        )?;
        log::info!(
            "resuming after ply {} with {} frontier boards and {} terminals",
            checkpoint.completed_ply,
            frontier.len(),
            store.len()
        );
        Ok((frontier, store, checkpoint.totals, Some(checkpoint.completed_ply)))
    }

    fn write_checkpoint(&self, frontier: &Frontier, store: &TerminalStore, totals: Totals) -> Result<()> {
        let dir = depth_dir(std::path::Path::new("frontier"), frontier.ply());
        let checkpoint = Checkpoint {
            completed_ply: frontier.ply(),
            frontier_dir: dir.to_string_lossy().into_owned(),
            frontier_len: frontier.len() as u64,
            terminals_bytes: store.bytes(),
            text_bytes: store.text_bytes(),
            totals,
        };
        checkpoint.save(&self.config.checkpoint_path())
    }

    fn heartbeat(&self, ply: usize, batches: u64) -> Result<ProgressBar> {
        if self.config.quiet {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(batches);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] ply {msg} {bar:40.cyan/blue} {pos}/{len} batches")
                .map_err(|e| Error::config(format!("progress template: {e}")))?
                .progress_chars("=>-"),
        );
        pb.set_message(format!("{ply:>2}"));
        Ok(pb)
    }

    /// Expands `frontier` into the next ply.
    fn run_depth(&self, frontier: &Frontier, store: &mut TerminalStore) -> Result<(DepthStats, Frontier)> {
        let started = Instant::now();
        let ply = frontier.ply() + 1;
        let mut stats = DepthStats::new(ply, frontier.len() as u64);
        let mut writer = FrontierWriter::create(&self.config.frontier_root(), ply, self.config.chunk_capacity)?;
        let seen = ShardedKeySet::new();

        let batches: usize = frontier.chunk_sizes().map(|n| self.plan.chunk_count(n)).sum();
        let heartbeat = self.heartbeat(ply, batches as u64)?;
        // A bar on a non-terminal stderr draws nothing, so fall back to log lines.
        let log_step = (!self.config.quiet && heartbeat.is_hidden()).then(|| log_every(batches));
        let mut done = 0usize;

        for chunk in frontier.chunks() {
            let boards = chunk?;
            for batch in self.plan.batches(&boards) {
                let (classified, chunk_stats) = self.process_batch(batch, ply, &seen)?;
                for (canonical, outcome) in classified.terminals() {
                    store.append(&TerminalRecord {
                        board: canonical.key,
                        outcome,
                    })?;
                }
                writer.extend(classified.ongoing.iter().map(|c| c.key))?;
                log::debug!(
                    "ply {ply} batch {}: {} parents, {} generated, {} new canonical, {} terminal",
                    stats.batches,
                    chunk_stats.parents,
                    chunk_stats.generated,
                    chunk_stats.stages.survivors() - chunk_stats.cross_chunk_duplicates,
                    classified.terminal_count()
                );
                stats.add_chunk(&chunk_stats);
                heartbeat.inc(1);
                done += 1;
                if log_step.is_some_and(|step| done % step == 0 || done == batches) {
                    log::info!("ply {ply}: {done}/{batches} batches");
                }
            }
        }
        heartbeat.finish_and_clear();

        let next = writer.finish(true)?;
        stats.spilled_chunks = next.spilled_chunks() as u64;
        stats.set_elapsed(started.elapsed());
        log::info!(
            "ply {:>2}: {} parents -> {} generated, {} canonical ({} X wins, {} O wins, {} draws, {} ongoing) in {:.2?}",
            ply,
            stats.frontier_in,
            stats.generated,
            stats.canonical(),
            stats.x_wins,
            stats.o_wins,
            stats.draws,
            stats.ongoing,
            started.elapsed()
        );
        Ok((stats, next))
    }

    /// Runs one batch of frontier boards at `ply - 1` through the whole pipeline.
    ///
    /// `seen` holds the canonical keys already admitted at `ply`; a key found
    /// there is dropped as a cross-batch duplicate.
    pub fn process_batch(
        &self,
        parents: &[PackedBoard],
        ply: usize,
        seen: &ShardedKeySet,
    ) -> Result<(Classified, ChunkStats)> {
        if parents.len() > self.plan.boards_per_batch() {
            return Err(Error::backend(
                self.backend.name(),
                format!(
                    "batch of {} boards exceeds the planned {}",
                    parents.len(),
                    self.plan.boards_per_batch()
                ),
            ));
        }
        self.pool.install(|| {
            let sequences = parents
                .par_iter()
                .map(|board| board.to_sequence())
                .collect::<Result<Vec<MoveSequence>>>()?;
            let children = self.backend.expand(&sequences)?;
            let generated = children.len() as u64;

            let output = Pipeline::new(self.backend.as_ref()).canonicalize(children)?;
            let before = output.survivors.len();
            let fresh: Vec<Canonical> = output
                .survivors
                .into_iter()
                .filter(|c| seen.insert(c.key.raw()))
                .collect();

            let mut stats = ChunkStats {
                parents: parents.len() as u64,
                generated,
                stages: output.counts,
                cross_chunk_duplicates: (before - fresh.len()) as u64,
                ..ChunkStats::default()
            };
            let classified = self.classifier.partition(fresh, ply, self.backend.as_ref())?;
            stats.record_outcomes(&classified);
            Ok((classified, stats))
        })
    }
}

/// Batches between progress log lines, about a tenth of the depth
fn log_every(batches: usize) -> usize {
    (batches / 10).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::config::BackendChoice;

    fn enumerator(dir: &std::path::Path, max_ply: usize) -> Enumerator {
        let config = RunConfig {
            output_dir: dir.to_path_buf(),
            max_ply,
            backend: BackendChoice::Cpu,
            quiet: true,
            ..RunConfig::default()
        };
        let backend = Box::new(CpuBackend::new(Arc::new(ConstantTables::generated())));
        Enumerator::new(config, backend).unwrap()
    }

    #[test]
    fn first_depths_match_known_counts() {
        let dir = tempfile::tempdir().unwrap();
        let summary = enumerator(dir.path(), 3).run().unwrap();
        let canonical: Vec<u64> = summary.depths.iter().map(|d| d.canonical()).collect();
        assert_eq!(canonical, vec![4, 35, 382]);
        let generated: Vec<u64> = summary.depths.iter().map(|d| d.generated).collect();
        assert_eq!(generated, vec![27, 104, 875]);
        assert_eq!(summary.totals.terminals(), 0);
        assert_eq!(summary.final_ply, 3);
        assert_eq!(summary.open_frontier, 382);
        assert!(summary.warnings.is_empty());
        assert!(summary.device.is_none());
    }

    #[test]
    fn progress_lines_are_spaced_by_tenths() {
        assert_eq!(log_every(0), 1);
        assert_eq!(log_every(7), 1);
        assert_eq!(log_every(10), 1);
        assert_eq!(log_every(250), 25);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RunConfig {
            output_dir: dir.path().to_path_buf(),
            host_budget_bytes: 27 * 32 * 2,
            ..RunConfig::default()
        };
        config.quiet = true;
        let backend = Box::new(CpuBackend::new(Arc::new(ConstantTables::generated())));
        let enumerator = Enumerator::new(config, backend).unwrap();
        let parents = vec![PackedBoard::EMPTY; 3];
        let err = enumerator
            .process_batch(&parents, 1, &ShardedKeySet::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Backend);
    }
}
