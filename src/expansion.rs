//! Child generation: one more move for the player whose turn it is.

use rayon::prelude::*;

use cube_shared::{CELLS, MAX_PLY};

use crate::board::{MoveSequence, Symbol};

/// Upper bound on children per parent
pub const EXPANSION_FACTOR: usize = CELLS;

/// Children of a single parent, unoccupied cells in ascending order.
///
/// Only "already played in this sequence" is checked; a parent with repeated
/// cells still expands and its children are left for the validity filter.
pub fn children(parent: &MoveSequence) -> impl Iterator<Item = MoveSequence> + '_ {
    let full = parent.ply() >= MAX_PLY;
    let occupied = parent.occupied_mask();
    let player = parent.next_player();
    (0..CELLS)
        .filter(move |&cell| !full && occupied & (1 << cell) == 0)
        .map(move |cell| parent.with_symbol(Symbol::new(cell, player)))
}

/// Expands a batch, output grouped parent by parent in input order.
pub fn expand(parents: &[MoveSequence]) -> Vec<MoveSequence> {
    parents.par_iter().flat_map_iter(children).collect()
}
