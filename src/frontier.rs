//! # Segmented Frontier Store
//!
//! The ongoing boards of one ply, held as an ordered list of chunks. A chunk is
//! either resident or spilled to `depth_NN/chunk_NNNNN.bin` as headerless
//! little-endian `u64` records. Readers only ever see [`Frontier::chunks`], so
//! whether a chunk came from memory or disk makes no difference to them.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::board::PackedBoard;
use crate::error::{Error, Result};

const RECORD_BYTES: usize = 8;

/// Directory holding the chunks of `ply` under `root`.
pub fn depth_dir(root: &Path, ply: usize) -> PathBuf {
    root.join(format!("depth_{ply:02}"))
}

#[derive(Debug)]
pub enum Chunk {
    Resident(Vec<PackedBoard>),
    Spilled { path: PathBuf, len: usize },
}

impl Chunk {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Resident(boards) => boards.len(),
            Chunk::Spilled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load(&self) -> Result<Vec<PackedBoard>> {
        match self {
            Chunk::Resident(boards) => Ok(boards.clone()),
            Chunk::Spilled { path, len } => {
                let boards = read_chunk(path)?;
                if boards.len() != *len {
                    return Err(Error::Consistency {
                        message: format!(
                            "chunk '{}' holds {} boards, expected {len}",
                            path.display(),
                            boards.len()
                        ),
                    });
                }
                Ok(boards)
            }
        }
    }
}

/// Ongoing boards at one ply.
#[derive(Debug)]
pub struct Frontier {
    ply: usize,
    dir: Option<PathBuf>,
    chunks: Vec<Chunk>,
}

impl Frontier {
    /// The empty board at ply 0
    pub fn seed() -> Self {
        Frontier::from_boards(0, vec![PackedBoard::EMPTY])
    }

    pub fn from_boards(ply: usize, boards: Vec<PackedBoard>) -> Self {
        let chunks = if boards.is_empty() {
            Vec::new()
        } else {
            vec![Chunk::Resident(boards)]
        };
        Frontier { ply, dir: None, chunks }
    }

    /// Reopens a depth directory written with `finish(true)`.
    pub fn open(root: &Path, ply: usize) -> Result<Self> {
        let dir = depth_dir(root, ply);
        let entries = fs::read_dir(&dir).map_err(|e| Error::io("list frontier directory", &dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::io("list frontier directory", &dir, e))?.path();
            let is_chunk = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("chunk_") && n.ends_with(".bin"));
            if is_chunk {
                paths.push(path);
            }
        }
        paths.sort();

        let mut chunks = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::metadata(&path)
                .map_err(|e| Error::io("stat frontier chunk", &path, e))?
                .len() as usize;
            if bytes % RECORD_BYTES != 0 {
                return Err(Error::codec(format!(
                    "frontier chunk '{}' is {bytes} bytes, not a whole number of records",
                    path.display()
                )));
            }
            chunks.push(Chunk::Spilled {
                path,
                len: bytes / RECORD_BYTES,
            });
        }
        Ok(Frontier {
            ply,
            dir: Some(dir),
            chunks,
        })
    }

    pub fn ply(&self) -> usize {
        self.ply
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.chunks.iter().map(Chunk::len)
    }

    pub fn spilled_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c, Chunk::Spilled { .. }))
            .count()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Chunk contents in write order, loading spilled chunks one at a time.
    pub fn chunks(&self) -> impl Iterator<Item = Result<Vec<PackedBoard>>> + '_ {
        self.chunks.iter().map(Chunk::load)
    }

    /// Deletes any files backing this frontier.
    pub fn release(self) -> Result<()> {
        if let Some(dir) = &self.dir {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| Error::io("remove frontier directory", dir, e))?;
            }
        }
        Ok(())
    }
}

/// Append-only builder for the next ply's frontier.
#[derive(Debug)]
pub struct FrontierWriter {
    ply: usize,
    dir: PathBuf,
    capacity: usize,
    resident: Vec<PackedBoard>,
    chunks: Vec<Chunk>,
    written: usize,
}

impl FrontierWriter {
    /// Starts a fresh depth directory, clearing anything a failed run left there.
    pub fn create(root: &Path, ply: usize, capacity: usize) -> Result<Self> {
        let dir = depth_dir(root, ply);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| Error::io("clear frontier directory", &dir, e))?;
        }
        Ok(FrontierWriter {
            ply,
            dir,
            capacity: capacity.max(1),
            resident: Vec::new(),
            chunks: Vec::new(),
            written: 0,
        })
    }

    pub fn push(&mut self, board: PackedBoard) -> Result<()> {
        if self.resident.len() >= self.capacity {
            self.spill()?;
        }
        self.resident.push(board);
        self.written += 1;
        Ok(())
    }

    pub fn extend(&mut self, boards: impl IntoIterator<Item = PackedBoard>) -> Result<()> {
        for board in boards {
            self.push(board)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    fn spill(&mut self) -> Result<()> {
        if self.resident.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| Error::io("create frontier directory", &self.dir, e))?;
        let path = self.dir.join(format!("chunk_{:05}.bin", self.chunks.len()));
        write_chunk(&path, &self.resident)?;
        log::debug!(
            "spilled {} boards of ply {} to {}",
            self.resident.len(),
            self.ply,
            path.display()
        );
        let len = self.resident.len();
        self.resident.clear();
        self.chunks.push(Chunk::Spilled { path, len });
        Ok(())
    }

    /// Closes the writer. With `persist` the resident tail is spilled as well,
    /// so the whole frontier can be reopened from disk.
    pub fn finish(mut self, persist: bool) -> Result<Frontier> {
        if persist {
            self.spill()?;
            fs::create_dir_all(&self.dir).map_err(|e| Error::io("create frontier directory", &self.dir, e))?;
        } else if !self.resident.is_empty() {
            let tail = std::mem::take(&mut self.resident);
            self.chunks.push(Chunk::Resident(tail));
        }
        let dir = self.dir.exists().then(|| self.dir.clone());
        Ok(Frontier {
            ply: self.ply,
            dir,
            chunks: self.chunks,
        })
    }
}

fn write_chunk(path: &Path, boards: &[PackedBoard]) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io("create frontier chunk", path, e))?;
    let mut out = BufWriter::new(file);
    for board in boards {
        out.write_all(&board.raw().to_le_bytes())
            .map_err(|e| Error::io("write frontier chunk", path, e))?;
    }
    let file = out
        .into_inner()
        .map_err(|e| Error::io("flush frontier chunk", path, e.into_error()))?;
    file.sync_all().map_err(|e| Error::io("sync frontier chunk", path, e))
}

fn read_chunk(path: &Path) -> Result<Vec<PackedBoard>> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| Error::io("read frontier chunk", path, e))?;
    if bytes.len() % RECORD_BYTES != 0 {
        return Err(Error::codec(format!(
            "frontier chunk '{}' has a truncated record",
            path.display()
        )));
    }
    bytes
        .chunks_exact(RECORD_BYTES)
        .map(|record| {
            let mut raw = [0u8; RECORD_BYTES];
            raw.copy_from_slice(record);
            PackedBoard::from_raw(u64::from_le_bytes(raw))
        })
        .collect()
}
