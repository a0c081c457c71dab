//! Depth-boundary checkpoint for resuming long runs.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::Totals;

/// State after the last fully completed depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Ply of the persisted frontier
    pub completed_ply: usize,
    /// Frontier directory, relative to the output directory
    pub frontier_dir: String,
    pub frontier_len: u64,
    /// Length of `terminals.bin` at the checkpoint
    pub terminals_bytes: u64,
    /// Length of `terminals.txt`, when the text mirror is on
    pub text_bytes: Option<u64>,
    pub totals: Totals,
}

impl Checkpoint {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io("read checkpoint", path, e))?;
        serde_json::from_str(&text).map_err(|source| Error::Checkpoint {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes through a temporary file and renames it over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| Error::Checkpoint {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(|e| Error::io("create checkpoint", &tmp, e))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| Error::io("write checkpoint", &tmp, e))?;
        drop(file);
        fs::rename(&tmp, path).map_err(|e| Error::io("replace checkpoint", path, e))
    }
}
