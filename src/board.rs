//! # Board Codec
//!
//! Two representations of a position on the 27-cell cube:
//!
//! - [`MoveSequence`]: the ordered move symbols, one per ply. `A..Z` are X
//!   moves on cells 0..25 and `a..z` the matching O moves; cell 26 uses `.`
//!   for X and `,` for O.
//! - [`PackedBoard`]: the 54-bit occupancy code, X mask in bits 0..27 and O
//!   mask in bits 27..54. Move order is not retained.

use std::fmt;
use std::str::FromStr;

use cube_shared::{CELLS, CELL_MASK, CODE_MASK, MAX_PLY};

use crate::error::{Error, Result};

/// One of the two players. X always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    X,
    O,
}

impl Player {
    /// Player to move once `ply` moves have been played.
    pub fn for_ply(ply: usize) -> Self {
        if ply % 2 == 0 {
            Player::X
        } else {
            Player::O
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::X => write!(f, "X"),
            Player::O => write!(f, "O"),
        }
    }
}

/// A single move: which cell, and which player moved there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u8);

impl Symbol {
    pub fn new(cell: usize, player: Player) -> Self {
        Symbol(cube_shared::symbol_for(cell, player == Player::X))
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match cube_shared::decode_symbol(byte) {
            Some(_) => Ok(Symbol(byte)),
            None => Err(Error::codec(format!(
                "byte {:#04x} ({:?}) is not a move symbol",
                byte, byte as char
            ))),
        }
    }

    pub fn cell(self) -> usize {
        self.decoded().0
    }

    pub fn player(self) -> Player {
        if self.decoded().1 {
            Player::X
        } else {
            Player::O
        }
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    fn decoded(self) -> (usize, bool) {
        // Only constructed from valid bytes.
        cube_shared::decode_symbol(self.0).unwrap_or((0, true))
    }
}

impl TryFrom<char> for Symbol {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        if c.is_ascii() {
            Symbol::from_byte(c as u8)
        } else {
            Err(Error::codec(format!("'{c}' is not a move symbol")))
        }
    }
}

/// Sequence form of a board: the ordered move symbols.
///
/// Stored inline (at most 27 symbols) so batches stay flat in memory and can be
/// copied straight into device records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoveSequence {
    len: u8,
    symbols: [u8; CELLS],
}

impl Default for MoveSequence {
    fn default() -> Self {
        Self::empty()
    }
}

impl MoveSequence {
    /// The empty board (ply 0)
    pub const fn empty() -> Self {
        MoveSequence {
            len: 0,
            symbols: [0; CELLS],
        }
    }

    /// Parses a symbol string such as `"ABc."`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut seq = MoveSequence::empty();
        for c in text.chars() {
            seq.push(Symbol::try_from(c)?)?;
        }
        Ok(seq)
    }

    /// Builds a sequence from raw bytes, rejecting anything outside the alphabet.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut seq = MoveSequence::empty();
        for &b in bytes {
            seq.push(Symbol::from_byte(b)?)?;
        }
        Ok(seq)
    }

    /// Number of moves played
    pub fn ply(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.symbols[..self.len as usize]
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.as_bytes().iter().map(|&b| Symbol(b))
    }

    /// Appends one move. Fails once 27 symbols are present.
    pub fn push(&mut self, symbol: Symbol) -> Result<()> {
        if self.len as usize >= MAX_PLY {
            return Err(Error::codec(format!(
                "sequence '{}' already holds {} moves",
                self, MAX_PLY
            )));
        }
        self.symbols[self.len as usize] = symbol.0;
        self.len += 1;
        Ok(())
    }

    /// Copy of `self` with one more symbol. The caller guarantees `ply() < 27`.
    pub fn with_symbol(&self, symbol: Symbol) -> Self {
        debug_assert!(self.ply() < MAX_PLY);
        let mut child = *self;
        child.symbols[child.len as usize] = symbol.0;
        child.len += 1;
        child
    }

    /// Player whose turn it is, from ply parity
    pub fn next_player(&self) -> Player {
        Player::for_ply(self.ply())
    }

    /// Cells touched by any symbol, regardless of player
    pub fn occupied_mask(&self) -> u32 {
        self.symbols().fold(0, |m, s| m | (1 << s.cell()))
    }

    /// True when no cell appears twice, counting `A` and `a` as the same cell.
    pub fn is_valid(&self) -> bool {
        let mut seen = 0u32;
        for s in self.symbols() {
            let bit = 1u32 << s.cell();
            if seen & bit != 0 {
                return false;
            }
            seen |= bit;
        }
        true
    }

    /// Order-independent occupancy signature.
    ///
    /// Meaningful for valid sequences only; a repeated cell owned by both
    /// players would set overlapping bits.
    pub fn signature(&self) -> PackedBoard {
        let (mut x, mut o) = (0u32, 0u32);
        for s in self.symbols() {
            match s.player() {
                Player::X => x |= 1 << s.cell(),
                Player::O => o |= 1 << s.cell(),
            }
        }
        PackedBoard(cube_shared::pack(x, o))
    }
}

impl fmt::Display for MoveSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.as_bytes() {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MoveSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MoveSequence(\"{}\")", self)
    }
}

impl FromStr for MoveSequence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MoveSequence::parse(s)
    }
}

/// Packed form of a board: X mask in bits 0..27, O mask in bits 27..54.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct PackedBoard(u64);

impl PackedBoard {
    pub const EMPTY: PackedBoard = PackedBoard(0);

    /// Validates a raw code: no bits above 54 and disjoint masks.
    pub fn from_raw(code: u64) -> Result<Self> {
        if code & !CODE_MASK != 0 {
            return Err(Error::codec(format!("code {code:#x} has bits above bit 53")));
        }
        let board = PackedBoard(code);
        if !board.is_disjoint() {
            return Err(Error::codec(format!(
                "code {code:#x} assigns cells {:#x} to both players",
                board.x_mask() & board.o_mask()
            )));
        }
        Ok(board)
    }

    pub fn from_masks(x_mask: u32, o_mask: u32) -> Result<Self> {
        if (x_mask | o_mask) & !CELL_MASK != 0 {
            return Err(Error::codec("occupancy mask exceeds 27 cells"));
        }
        PackedBoard::from_raw(cube_shared::pack(x_mask, o_mask))
    }

    /// Wraps a code produced by trusted arithmetic (rotation images, kernels).
    pub(crate) fn from_raw_unchecked(code: u64) -> Self {
        PackedBoard(code)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn x_mask(self) -> u32 {
        cube_shared::x_mask(self.0)
    }

    pub fn o_mask(self) -> u32 {
        cube_shared::o_mask(self.0)
    }

    pub fn occupied(self) -> u32 {
        self.x_mask() | self.o_mask()
    }

    pub fn is_disjoint(self) -> bool {
        self.x_mask() & self.o_mask() == 0
    }

    /// Moves played, by population count
    pub fn ply(self) -> usize {
        self.occupied().count_ones() as usize
    }

    pub fn next_player(self) -> Player {
        Player::for_ply(self.ply())
    }

    pub fn owner(self, cell: usize) -> Option<Player> {
        if self.x_mask() & (1 << cell) != 0 {
            Some(Player::X)
        } else if self.o_mask() & (1 << cell) != 0 {
            Some(Player::O)
        } else {
            None
        }
    }

    pub fn empty_cells(self) -> impl Iterator<Item = usize> {
        let occupied = self.occupied();
        (0..CELLS).filter(move |&c| occupied & (1 << c) == 0)
    }

    pub fn with_move(self, cell: usize, player: Player) -> Self {
        debug_assert!(self.owner(cell).is_none());
        match player {
            Player::X => PackedBoard(self.0 | (1u64 << cell)),
            Player::O => PackedBoard(self.0 | (1u64 << (cell + CELLS))),
        }
    }

    /// A sequence that reaches this occupancy by strict alternation.
    ///
    /// X cells ascending are interleaved with O cells ascending, so the result
    /// is deterministic for a given code.
    pub fn to_sequence(self) -> Result<MoveSequence> {
        if !self.is_disjoint() {
            return Err(Error::codec(format!("code {:#x} has overlapping masks", self.0)));
        }
        let xs = self.x_mask().count_ones();
        let os = self.o_mask().count_ones();
        if xs != os && xs != os + 1 {
            return Err(Error::codec(format!(
                "code {:#x} has {xs} X and {os} O marks, not reachable by alternation",
                self.0
            )));
        }
        let cells_of = |mask: u32| (0..CELLS).filter(move |&c| mask & (1 << c) != 0);
        let mut x_cells = cells_of(self.x_mask());
        let mut o_cells = cells_of(self.o_mask());
        let mut seq = MoveSequence::empty();
        for ply in 0..(xs + os) as usize {
            let (cell, player) = match Player::for_ply(ply) {
                Player::X => (x_cells.next(), Player::X),
                Player::O => (o_cells.next(), Player::O),
            };
            let cell = cell.ok_or_else(|| Error::codec("alternation ran out of cells"))?;
            seq.push(Symbol::new(cell, player))?;
        }
        Ok(seq)
    }
}

impl From<PackedBoard> for u64 {
    fn from(board: PackedBoard) -> u64 {
        board.0
    }
}

impl fmt::Debug for PackedBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackedBoard({:#x})", self.0)
    }
}

/// Three 3x3 layers, bottom (z = 0) first, `x`/`o`/`-` per cell.
impl fmt::Display for PackedBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for z in 0..3 {
            if z > 0 {
                write!(f, " | ")?;
            }
            for y in 0..3 {
                if y > 0 {
                    write!(f, "/")?;
                }
                for x in 0..3 {
                    let c = match self.owner(cube_shared::cell_at(x, y, z)) {
                        Some(Player::X) => 'x',
                        Some(Player::O) => 'o',
                        None => '-',
                    };
                    write!(f, "{c}")?;
                }
            }
        }
        Ok(())
    }
}
