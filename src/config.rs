//! Run configuration.

use std::path::PathBuf;

use clap::ValueEnum;

use cube_shared::MAX_PLY;

use crate::classify::DEFAULT_EARLY_EXIT_PLY;
use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Which compute backend runs the per-board kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// GPU when an adapter is available, otherwise the host backend
    Auto,
    /// Host threads only
    Cpu,
    /// GPU or fail
    Gpu,
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendChoice::Auto => write!(f, "auto"),
            BackendChoice::Cpu => write!(f, "cpu"),
            BackendChoice::Gpu => write!(f, "gpu"),
        }
    }
}

/// Everything one enumeration run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Rotation table file; the built-in table when `None`
    pub rotation_table: Option<PathBuf>,
    /// Win-line table file; the built-in table when `None`
    pub win_line_table: Option<PathBuf>,
    /// Terminals, frontier chunks and the checkpoint live here
    pub output_dir: PathBuf,
    /// Host memory ceiling for one batch, bytes
    pub host_budget_bytes: u64,
    /// Device memory ceiling for one batch, bytes
    pub device_budget_bytes: u64,
    /// Boards at or below this ply are ongoing without a line test
    pub early_exit_ply: usize,
    /// Last ply to expand to
    pub max_ply: usize,
    pub backend: BackendChoice,
    /// Worker threads; 0 lets rayon decide
    pub threads: usize,
    /// Boards kept in memory per frontier chunk before spilling
    pub chunk_capacity: usize,
    /// Mirror terminals as `sequence:outcome` lines
    pub write_text: bool,
    /// Continue from `checkpoint.json`
    pub resume: bool,
    /// Keep each depth's frontier files after the run moves on
    pub keep_frontier: bool,
    /// Hide the progress heartbeat
    pub quiet: bool,
    /// Treat data-consistency findings as fatal
    pub strict: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rotation_table: None,
            win_line_table: None,
            output_dir: PathBuf::from("census-out"),
            host_budget_bytes: 1024 * MIB,
            device_budget_bytes: 256 * MIB,
            early_exit_ply: DEFAULT_EARLY_EXIT_PLY,
            max_ply: MAX_PLY,
            backend: BackendChoice::Auto,
            threads: 0,
            chunk_capacity: 1 << 20,
            write_text: false,
            resume: false,
            keep_frontier: false,
            quiet: false,
            strict: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_ply == 0 || self.max_ply > MAX_PLY {
            return Err(Error::config(format!(
                "max ply must be in 1..={MAX_PLY}, got {}",
                self.max_ply
            )));
        }
        if self.early_exit_ply > MAX_PLY {
            return Err(Error::config(format!(
                "early-exit ply must be at most {MAX_PLY}, got {}",
                self.early_exit_ply
            )));
        }
        if self.host_budget_bytes == 0 || self.device_budget_bytes == 0 {
            return Err(Error::config("memory budgets must be non-zero"));
        }
        if self.chunk_capacity == 0 {
            return Err(Error::config("frontier chunk capacity must be non-zero"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::config("output directory is empty"));
        }
        Ok(())
    }

    pub fn frontier_root(&self) -> PathBuf {
        self.output_dir.join("frontier")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join("checkpoint.json")
    }

    pub fn terminals_path(&self) -> PathBuf {
        self.output_dir.join("terminals.bin")
    }

    pub fn terminals_text_path(&self) -> PathBuf {
        self.output_dir.join("terminals.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = RunConfig {
            max_ply: 28,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
        config.max_ply = 5;
        config.host_budget_bytes = 0;
        assert!(config.validate().is_err());
        config.host_budget_bytes = 1;
        config.early_exit_ply = 30;
        assert!(config.validate().is_err());
    }
}
