#![no_std]

//! Board geometry and move-symbol alphabet for 3x3x3 tic-tac-toe.
//!
//! These are the primitives the WGSL kernels restate on the device side, kept
//! here once so the host codec, the constant tables and the CPU backend agree
//! bit-for-bit with the shaders.
//!
//! Cell `i` sits at `(x, y, z) = (i % 3, (i / 3) % 3, i / 9)`.
//! A packed code holds the X mask in bits 0..27 and the O mask in bits 27..54.

/// Number of cells on the cube
pub const CELLS: usize = 27;
/// Number of proper rotations of the cube
pub const ROTATIONS: usize = 24;
/// Ply of a full board
pub const MAX_PLY: usize = CELLS;
/// Bit offset of the O mask inside a packed code
pub const O_SHIFT: u32 = 27;
/// Mask covering one player's 27 cells
pub const CELL_MASK: u32 = (1 << CELLS) - 1;
/// Mask covering every meaningful bit of a packed code
pub const CODE_MASK: u64 = (1u64 << 54) - 1;

/// X's symbol for cell 26
pub const X_LAST_CELL: u8 = b'.';
/// O's symbol for cell 26
pub const O_LAST_CELL: u8 = b',';

/// Returns the ASCII symbol for a move on `cell` by X (`x_to_move`) or O.
///
/// Cells 0..26 map to `A..Z` / `a..z`, cell 26 to `.` / `,`.
pub fn symbol_for(cell: usize, x_to_move: bool) -> u8 {
    debug_assert!(cell < CELLS);
    match (cell, x_to_move) {
        (26, true) => X_LAST_CELL,
        (26, false) => O_LAST_CELL,
        (c, true) => b'A' + c as u8,
        (c, false) => b'a' + c as u8,
    }
}

/// Decodes a symbol into `(cell, is_x)`; `None` for bytes outside the alphabet.
pub fn decode_symbol(byte: u8) -> Option<(usize, bool)> {
    match byte {
        b'A'..=b'Z' => Some(((byte - b'A') as usize, true)),
        b'a'..=b'z' => Some(((byte - b'a') as usize, false)),
        X_LAST_CELL => Some((26, true)),
        O_LAST_CELL => Some((26, false)),
        _ => None,
    }
}

/// Joins two 27-bit occupancy masks into a packed code.
#[inline]
pub fn pack(x_mask: u32, o_mask: u32) -> u64 {
    (x_mask & CELL_MASK) as u64 | (((o_mask & CELL_MASK) as u64) << O_SHIFT)
}

#[inline]
pub fn x_mask(code: u64) -> u32 {
    (code as u32) & CELL_MASK
}

#[inline]
pub fn o_mask(code: u64) -> u32 {
    ((code >> O_SHIFT) as u32) & CELL_MASK
}

/// Splits a code into the `(lo, hi)` u32 pair the kernels operate on.
#[inline]
pub fn split_code(code: u64) -> (u32, u32) {
    (code as u32, (code >> 32) as u32)
}

#[inline]
pub fn join_code(lo: u32, hi: u32) -> u64 {
    lo as u64 | ((hi as u64) << 32)
}

/// Moves every set bit `i` of `mask` to bit `perm[i]`.
pub fn remap_mask(mask: u32, perm: &[u8; CELLS]) -> u32 {
    let mut out = 0u32;
    let mut rest = mask & CELL_MASK;
    while rest != 0 {
        let cell = rest.trailing_zeros() as usize;
        out |= 1 << perm[cell];
        rest &= rest - 1;
    }
    out
}

/// Applies a cell permutation to both halves of a packed code.
pub fn remap_code(code: u64, perm: &[u8; CELLS]) -> u64 {
    pack(remap_mask(x_mask(code), perm), remap_mask(o_mask(code), perm))
}

/// Bit mask of the three cells of a line.
#[inline]
pub fn line_mask(line: [u8; 3]) -> u32 {
    (1 << line[0]) | (1 << line[1]) | (1 << line[2])
}

/// True when `mask` owns every cell of `line`.
#[inline]
pub fn owns_line(mask: u32, line: u32) -> bool {
    mask & line == line
}

/// Cartesian coordinates of a cell.
#[inline]
pub fn coords(cell: usize) -> [i32; 3] {
    [(cell % 3) as i32, ((cell / 3) % 3) as i32, (cell / 9) as i32]
}

/// Cell index of in-range coordinates.
#[inline]
pub fn cell_at(x: i32, y: i32, z: i32) -> usize {
    (x + y * 3 + z * 9) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip_every_cell() {
        for cell in 0..CELLS {
            for x in [true, false] {
                assert_eq!(decode_symbol(symbol_for(cell, x)), Some((cell, x)));
            }
        }
        assert_eq!(symbol_for(26, true), b'.');
        assert_eq!(symbol_for(26, false), b',');
        assert_eq!(decode_symbol(b'#'), None);
    }

    #[test]
    fn remap_swaps_bits() {
        let mut perm = [0u8; CELLS];
        for (i, p) in perm.iter_mut().enumerate() {
            *p = i as u8;
        }
        perm.swap(0, 1);
        let code = pack(0b001, 0b100);
        assert_eq!(remap_code(code, &perm), pack(0b010, 0b100));
    }

    #[test]
    fn split_and_join_are_inverse() {
        let code = pack(CELL_MASK, 0x5_5555) | (1 << 53);
        let (lo, hi) = split_code(code);
        assert_eq!(join_code(lo, hi), code);
        assert_eq!(code & !CODE_MASK, 0);
    }
}
