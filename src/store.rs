//! Append-only terminal output store.
//!
//! `terminals.bin` holds 9-byte records: the canonical code as a little-endian
//! `u64` followed by the outcome tag. The optional text mirror has one
//! `SEQUENCE:T` line per record, where `T` is the outcome letter.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::board::PackedBoard;
use crate::classify::Outcome;
use crate::error::{Error, Result};

pub const RECORD_BYTES: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalRecord {
    pub board: PackedBoard,
    pub outcome: Outcome,
}

impl TerminalRecord {
    pub fn encode(&self) -> [u8; RECORD_BYTES] {
        let mut out = [0u8; RECORD_BYTES];
        out[..8].copy_from_slice(&self.board.raw().to_le_bytes());
        out[8] = self.outcome.tag();
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_BYTES {
            return Err(Error::codec(format!("terminal record is {} bytes", bytes.len())));
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        let outcome = Outcome::from_tag(bytes[8])?;
        if !outcome.is_terminal() {
            return Err(Error::codec("terminal record tagged ongoing"));
        }
        Ok(TerminalRecord {
            board: PackedBoard::from_raw(u64::from_le_bytes(raw))?,
            outcome,
        })
    }

    /// Text mirror line, without the newline
    pub fn text_line(&self) -> Result<String> {
        Ok(format!("{}:{}", self.board.to_sequence()?, self.outcome.letter()))
    }
}

struct Sink {
    path: PathBuf,
    out: BufWriter<File>,
    bytes: u64,
}

impl Sink {
    fn open(path: &Path, keep_bytes: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io("open terminal store", path, e))?;
        file.set_len(keep_bytes)
            .map_err(|e| Error::io("truncate terminal store", path, e))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| Error::io("seek terminal store", path, e))?;
        Ok(Sink {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            bytes: keep_bytes,
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.out
            .write_all(data)
            .map_err(|e| Error::io("append to terminal store", &self.path, e))?;
        self.bytes += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| Error::io("flush terminal store", &self.path, e))?;
        self.out
            .get_ref()
            .sync_data()
            .map_err(|e| Error::io("sync terminal store", &self.path, e))
    }
}

/// Writer for the permanent terminal output.
pub struct TerminalStore {
    binary: Sink,
    text: Option<Sink>,
    records: u64,
}

impl TerminalStore {
    /// Starts an empty store, discarding earlier contents.
    pub fn create(path: &Path, text_path: Option<&Path>) -> Result<Self> {
        Self::reopen(path, 0, text_path.map(|p| (p, 0)))
    }

    /// Reopens a store cut back to the given lengths, dropping anything a
    /// failed depth appended after the last checkpoint.
    pub fn reopen(path: &Path, bytes: u64, text: Option<(&Path, u64)>) -> Result<Self> {
        if bytes % RECORD_BYTES as u64 != 0 {
            return Err(Error::codec(format!(
                "terminal store length {bytes} is not a whole number of records"
            )));
        }
        let binary = Sink::open(path, bytes)?;
        let text = text.map(|(p, len)| Sink::open(p, len)).transpose()?;
        Ok(TerminalStore {
            binary,
            text,
            records: bytes / RECORD_BYTES as u64,
        })
    }

    pub fn append(&mut self, record: &TerminalRecord) -> Result<()> {
        self.binary.write(&record.encode())?;
        if let Some(text) = self.text.as_mut() {
            let mut line = record.text_line()?;
            line.push('\n');
            text.write(line.as_bytes())?;
        }
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.binary.flush()?;
        if let Some(text) = self.text.as_mut() {
            text.flush()?;
        }
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Bytes written to the binary store
    pub fn bytes(&self) -> u64 {
        self.binary.bytes
    }

    /// Bytes written to the text mirror, if any
    pub fn text_bytes(&self) -> Option<u64> {
        self.text.as_ref().map(|t| t.bytes)
    }

    pub fn read_all(path: &Path) -> Result<Vec<TerminalRecord>> {
        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| Error::io("read terminal store", path, e))?;
        if bytes.len() % RECORD_BYTES != 0 {
            return Err(Error::codec(format!(
                "terminal store '{}' ends in a partial record",
                path.display()
            )));
        }
        bytes.chunks_exact(RECORD_BYTES).map(TerminalRecord::decode).collect()
    }
}
