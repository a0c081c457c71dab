//! # 3x3x3 Tic-Tac-Toe Census
//!
//! Enumerates every reachable position of tic-tac-toe on a 3x3x3 cube, one ply
//! at a time, collapsing positions that differ only by move order or by a
//! rotation of the cube, and writes every canonical terminal position (X win,
//! O win or draw) to a compact store.
//!
//! The moving parts, leaves first:
//! - [`board`]: sequence and packed board forms
//! - [`tables`]: rotation maps and win lines
//! - [`expansion`], [`canonical`], [`classify`]: the per-batch pipeline
//! - [`backend`]: where the per-board work runs (rayon, or wgpu with `gpu`)
//! - [`batch`], [`frontier`], [`store`], [`checkpoint`]: memory budgets and disk
//! - [`driver`]: the depth-by-depth traversal tying it together

pub mod backend;
pub mod batch;
pub mod board;
pub mod canonical;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod error;
pub mod expansion;
pub mod frontier;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod stats;
pub mod store;
pub mod tables;

pub use backend::{BackendLimits, ComputeBackend, CpuBackend};
pub use batch::{BatchPlan, BYTES_PER_BOARD};
pub use board::{MoveSequence, PackedBoard, Player, Symbol};
pub use canonical::{Canonical, Pipeline, StageCounts};
pub use classify::{Classified, Classifier, Outcome};
pub use config::{BackendChoice, RunConfig};
pub use driver::Enumerator;
pub use error::{Error, ErrorKind, Result};
pub use expansion::{expand, EXPANSION_FACTOR};
pub use frontier::{Frontier, FrontierWriter};
pub use stats::{DepthStats, DeviceUsage, RunSummary, Totals};
pub use store::{TerminalRecord, TerminalStore};
pub use tables::{ConstantTables, RotationTable, WinLineTable};
