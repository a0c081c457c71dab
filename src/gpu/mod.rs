//! # GPU Compute Backend
//!
//! Runs the per-board census kernels (expansion, signatures, orbit minima,
//! line tests) through WebGPU (wgpu), so the same code targets Vulkan, Metal
//! and DX12.
//!
//! ## Architecture
//! - `GpuContext`: device, queue and the four compiled kernels
//! - `GpuBackend`: the [`ComputeBackend`](crate::backend::ComputeBackend)
//!   implementation that owns a context and the uploaded constant tables
//! - `shaders`: WGSL sources

mod accelerator;
mod context;
mod shaders;

use std::sync::Arc;

use crate::tables::ConstantTables;

pub use accelerator::{decode_record, encode_sequences, GpuBackend, RECORD_WORDS};
pub use context::{GpuContext, GpuError};

/// Configuration for GPU acceleration
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Whether to prefer high-performance GPU over low-power GPU
    pub prefer_high_performance: bool,
    /// Device memory one batch may use across all its buffers
    pub memory_budget_bytes: u64,
    /// Below this many items a call runs on the host instead (transfer overhead dominates)
    pub min_batch_threshold: usize,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            prefer_high_performance: true,
            memory_budget_bytes: 1024 * 1024 * 1024,
            min_batch_threshold: 256,
        }
    }
}

/// Result of GPU initialization
#[derive(Debug)]
pub enum GpuInitResult {
    /// GPU initialized successfully
    Success(GpuBackend),
    /// GPU not available
    Unavailable(String),
    /// GPU initialization failed with error
    Error(String),
}

/// Attempts to bring up a GPU backend for `tables`
///
/// A missing adapter is reported as `Unavailable` so callers can fall back;
/// anything else (device request, shader compilation) is an `Error`.
pub fn try_init_gpu(config: &GpuConfig, tables: Arc<ConstantTables>) -> GpuInitResult {
    match GpuContext::new(config) {
        Ok(ctx) => {
            log::debug!("{}", ctx.debug_info());
            GpuInitResult::Success(GpuBackend::new(ctx, tables))
        }
        Err(e @ GpuError::NoAdapter(_)) => GpuInitResult::Unavailable(e.to_string()),
        Err(e) => GpuInitResult::Error(e.to_string()),
    }
}
