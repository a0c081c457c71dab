//! Terminal classification of canonical boards.

use std::fmt;

use serde::{Deserialize, Serialize};

use cube_shared::MAX_PLY;

use crate::backend::ComputeBackend;
use crate::board::PackedBoard;
use crate::canonical::Canonical;
use crate::error::{Error, Result};
use crate::tables::WinLineTable;

/// Highest ply at which no line can be complete: X owns at most two cells
/// before ply 5.
pub const DEFAULT_EARLY_EXIT_PLY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Ongoing,
    XWin,
    OWin,
    Draw,
}

impl Outcome {
    /// On-disk tag
    pub fn tag(self) -> u8 {
        match self {
            Outcome::Ongoing => 0,
            Outcome::XWin => 1,
            Outcome::OWin => 2,
            Outcome::Draw => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Outcome::Ongoing),
            1 => Ok(Outcome::XWin),
            2 => Ok(Outcome::OWin),
            3 => Ok(Outcome::Draw),
            other => Err(Error::codec(format!("unknown outcome tag {other}"))),
        }
    }

    /// Single-letter marker used in the text mirror
    pub fn letter(self) -> char {
        match self {
            Outcome::Ongoing => '?',
            Outcome::XWin => 'X',
            Outcome::OWin => 'O',
            Outcome::Draw => 'D',
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Outcome::Ongoing
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Ongoing => "ongoing",
            Outcome::XWin => "X wins",
            Outcome::OWin => "O wins",
            Outcome::Draw => "draw",
        };
        f.write_str(name)
    }
}

/// Line test without the early-exit shortcut.
///
/// X lines are tested first; a full board with no line is a draw.
pub fn outcome_of(board: PackedBoard, ply: usize, lines: &WinLineTable) -> Outcome {
    let (x, o) = (board.x_mask(), board.o_mask());
    if lines.masks().iter().any(|&m| cube_shared::owns_line(x, m)) {
        Outcome::XWin
    } else if lines.masks().iter().any(|&m| cube_shared::owns_line(o, m)) {
        Outcome::OWin
    } else if ply >= MAX_PLY {
        Outcome::Draw
    } else {
        Outcome::Ongoing
    }
}

/// Canonical boards of one batch split by outcome.
#[derive(Debug, Default)]
pub struct Classified {
    pub x_wins: Vec<Canonical>,
    pub o_wins: Vec<Canonical>,
    pub draws: Vec<Canonical>,
    pub ongoing: Vec<Canonical>,
}

impl Classified {
    pub fn terminal_count(&self) -> usize {
        self.x_wins.len() + self.o_wins.len() + self.draws.len()
    }

    /// Terminal boards with their outcome
    pub fn terminals(&self) -> impl Iterator<Item = (&Canonical, Outcome)> {
        self.x_wins
            .iter()
            .map(|c| (c, Outcome::XWin))
            .chain(self.o_wins.iter().map(|c| (c, Outcome::OWin)))
            .chain(self.draws.iter().map(|c| (c, Outcome::Draw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    pub early_exit_ply: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier {
            early_exit_ply: DEFAULT_EARLY_EXIT_PLY,
        }
    }
}

impl Classifier {
    pub fn new(early_exit_ply: usize) -> Self {
        Classifier { early_exit_ply }
    }

    /// True when boards at `ply` are reported ongoing without looking at them.
    pub fn skips(&self, ply: usize) -> bool {
        ply <= self.early_exit_ply
    }

    pub fn classify(&self, board: PackedBoard, ply: usize, lines: &WinLineTable) -> Outcome {
        if self.skips(ply) {
            Outcome::Ongoing
        } else {
            outcome_of(board, ply, lines)
        }
    }

    /// Splits a canonical batch at `ply`, win tests run on `backend`.
    pub fn partition(
        &self,
        batch: Vec<Canonical>,
        ply: usize,
        backend: &dyn ComputeBackend,
    ) -> Result<Classified> {
        if self.skips(ply) || batch.is_empty() {
            return Ok(Classified {
                ongoing: batch,
                ..Classified::default()
            });
        }
        let keys: Vec<PackedBoard> = batch.iter().map(|c| c.key).collect();
        let outcomes = backend.classify(&keys, ply)?;
        if outcomes.len() != batch.len() {
            return Err(Error::backend(
                backend.name(),
                format!("classified {} of {} boards", outcomes.len(), batch.len()),
            ));
        }
        let mut out = Classified::default();
        for (canonical, outcome) in batch.into_iter().zip(outcomes) {
            match outcome {
                Outcome::XWin => out.x_wins.push(canonical),
                Outcome::OWin => out.o_wins.push(canonical),
                Outcome::Draw => out.draws.push(canonical),
                Outcome::Ongoing => out.ongoing.push(canonical),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for o in [Outcome::Ongoing, Outcome::XWin, Outcome::OWin, Outcome::Draw] {
            assert_eq!(Outcome::from_tag(o.tag()).unwrap(), o);
        }
        assert!(Outcome::from_tag(9).is_err());
    }

    #[test]
    fn early_exit_ignores_a_complete_line() {
        let lines = WinLineTable::generate();
        let board = PackedBoard::from_masks(0b111, 0b11 << 9).unwrap();
        let classifier = Classifier::new(4);
        assert_eq!(classifier.classify(board, 4, &lines), Outcome::Ongoing);
        assert_eq!(classifier.classify(board, 5, &lines), Outcome::XWin);
    }

    #[test]
    fn o_line_and_open_board() {
        let lines = WinLineTable::generate();
        let classifier = Classifier::default();
        let o_line = PackedBoard::from_masks(0b1_0000_0011 << 9, 0b111).unwrap();
        assert_eq!(classifier.classify(o_line, 6, &lines), Outcome::OWin);
        let open = PackedBoard::from_masks(0b1_0000_0011, 0b110 << 9).unwrap();
        assert_eq!(classifier.classify(open, 5, &lines), Outcome::Ongoing);
    }
}
