//! # Compute Backends
//!
//! The per-board heavy lifting (children, signatures, orbit minima and line
//! tests) sits behind [`ComputeBackend`]. The host backend runs on the rayon
//! pool; the `gpu` feature adds a wgpu backend with the same contract.
//!
//! A backend is constructed explicitly and handed to the driver, which owns
//! it for the whole run.

use std::sync::Arc;

use rayon::prelude::*;

use crate::board::{MoveSequence, PackedBoard};
use crate::canonical;
use crate::classify::{self, Outcome};
use crate::config::BackendChoice;
use crate::error::{Error, Result};
use crate::expansion;
use crate::stats::DeviceUsage;
use crate::tables::ConstantTables;

/// Allocation ceilings the batch planner must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendLimits {
    /// Largest single buffer the backend can allocate
    pub max_buffer_bytes: u64,
    /// Total memory the backend may use for one batch
    pub memory_budget_bytes: u64,
}

impl BackendLimits {
    pub const UNBOUNDED: BackendLimits = BackendLimits {
        max_buffer_bytes: u64::MAX,
        memory_budget_bytes: u64::MAX,
    };
}

/// Data-parallel per-board operations.
///
/// Each output vector has exactly one entry per input, in input order, except
/// `expand`, whose length is the number of children produced.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn limits(&self) -> BackendLimits;

    fn tables(&self) -> &ConstantTables;

    /// Children of every parent, grouped parent by parent
    fn expand(&self, parents: &[MoveSequence]) -> Result<Vec<MoveSequence>>;

    /// Occupancy signatures of valid sequences
    fn signatures(&self, batch: &[MoveSequence]) -> Result<Vec<PackedBoard>>;

    /// Orbit minimum of every code
    fn rotation_keys(&self, codes: &[PackedBoard]) -> Result<Vec<u64>>;

    /// Line test of every code at `ply`, without the early-exit shortcut
    fn classify(&self, codes: &[PackedBoard], ply: usize) -> Result<Vec<Outcome>>;

    /// Dispatch totals so far; host backends have none
    fn device_usage(&self) -> Option<DeviceUsage> {
        None
    }
}

/// Host backend on the current rayon pool.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    tables: Arc<ConstantTables>,
}

impl CpuBackend {
    pub fn new(tables: Arc<ConstantTables>) -> Self {
        CpuBackend { tables }
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn limits(&self) -> BackendLimits {
        BackendLimits::UNBOUNDED
    }

    fn tables(&self) -> &ConstantTables {
        &self.tables
    }

    fn expand(&self, parents: &[MoveSequence]) -> Result<Vec<MoveSequence>> {
        Ok(expansion::expand(parents))
    }

    fn signatures(&self, batch: &[MoveSequence]) -> Result<Vec<PackedBoard>> {
        Ok(batch.par_iter().map(MoveSequence::signature).collect())
    }

    fn rotation_keys(&self, codes: &[PackedBoard]) -> Result<Vec<u64>> {
        Ok(canonical::rotation_keys(&self.tables.rotations, codes))
    }

    fn classify(&self, codes: &[PackedBoard], ply: usize) -> Result<Vec<Outcome>> {
        let lines = &self.tables.win_lines;
        Ok(codes
            .par_iter()
            .map(|&code| classify::outcome_of(code, ply, lines))
            .collect())
    }
}

/// Builds the backend for `choice`.
///
/// `Auto` falls back to the host backend only when no adapter exists; any
/// other GPU failure, and any failure under `Gpu`, is returned.
pub fn select(choice: BackendChoice, tables: Arc<ConstantTables>) -> Result<Box<dyn ComputeBackend>> {
    match choice {
        BackendChoice::Cpu => Ok(Box::new(CpuBackend::new(tables))),
        BackendChoice::Auto | BackendChoice::Gpu => select_gpu(choice, tables),
    }
}

#[cfg(feature = "gpu")]
fn select_gpu(choice: BackendChoice, tables: Arc<ConstantTables>) -> Result<Box<dyn ComputeBackend>> {
    use crate::gpu::{self, GpuConfig, GpuInitResult};

    match gpu::try_init_gpu(&GpuConfig::default(), Arc::clone(&tables)) {
        GpuInitResult::Success(backend) => {
            log::info!("using GPU backend: {}", backend.adapter_name());
            Ok(Box::new(backend))
        }
        GpuInitResult::Unavailable(reason) if choice == BackendChoice::Auto => {
            log::warn!("no GPU adapter ({reason}); using the host backend");
            Ok(Box::new(CpuBackend::new(tables)))
        }
        GpuInitResult::Unavailable(reason) | GpuInitResult::Error(reason) => {
            Err(Error::backend("gpu", reason))
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn select_gpu(choice: BackendChoice, tables: Arc<ConstantTables>) -> Result<Box<dyn ComputeBackend>> {
    match choice {
        BackendChoice::Gpu => Err(Error::config("built without the `gpu` feature")),
        _ => Ok(Box::new(CpuBackend::new(tables))),
    }
}
