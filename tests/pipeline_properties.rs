use std::collections::HashSet;
use std::sync::Arc;

use census::canonical::validity_filter;
use census::{ConstantTables, CpuBackend, MoveSequence, PackedBoard, Pipeline, Player, RotationTable, Symbol};
use proptest::prelude::*;

/// A legal game prefix: distinct cells, strict alternation starting with X.
fn game() -> impl Strategy<Value = MoveSequence> {
    (Just((0..27usize).collect::<Vec<_>>()).prop_shuffle(), 0usize..=27).prop_map(|(cells, len)| {
        let mut seq = MoveSequence::empty();
        for (ply, &cell) in cells.iter().take(len).enumerate() {
            seq.push(Symbol::new(cell, Player::for_ply(ply))).unwrap();
        }
        seq
    })
}

/// Same occupancy, each player's cells played in reverse order.
fn reordered(seq: &MoveSequence) -> MoveSequence {
    let mut xs: Vec<usize> = seq.symbols().filter(|s| s.player() == Player::X).map(|s| s.cell()).collect();
    let mut os: Vec<usize> = seq.symbols().filter(|s| s.player() == Player::O).map(|s| s.cell()).collect();
    xs.reverse();
    os.reverse();
    let (mut xs, mut os) = (xs.into_iter(), os.into_iter());
    let mut out = MoveSequence::empty();
    for ply in 0..seq.ply() {
        let player = Player::for_ply(ply);
        let cell = match player {
            Player::X => xs.next().unwrap(),
            Player::O => os.next().unwrap(),
        };
        out.push(Symbol::new(cell, player)).unwrap();
    }
    out
}

fn backend() -> CpuBackend {
    CpuBackend::new(Arc::new(ConstantTables::generated()))
}

proptest! {
    #[test]
    fn canonical_key_is_rotation_invariant(seq in game()) {
        let table = RotationTable::generate();
        let code = seq.signature().raw();
        let key = table.canonical_key(code);
        for r in 0..table.len() {
            prop_assert_eq!(table.canonical_key(table.apply(r, code)), key);
        }
        prop_assert!(key <= code);
    }

    #[test]
    fn packed_masks_stay_disjoint(seq in game()) {
        let table = RotationTable::generate();
        let sig = seq.signature();
        prop_assert!(sig.is_disjoint());
        prop_assert_eq!(sig.ply(), seq.ply());
        for r in 0..table.len() {
            prop_assert!(PackedBoard::from_raw(table.apply(r, sig.raw())).is_ok());
        }
    }

    #[test]
    fn move_order_collapses_to_one_survivor(seq in game()) {
        let other = reordered(&seq);
        prop_assert_eq!(other.signature(), seq.signature());

        let backend = backend();
        let out = Pipeline::new(&backend).canonicalize(vec![seq, other]).unwrap();
        prop_assert_eq!(out.survivors.len(), 1);
        prop_assert_eq!(out.survivors[0].sequence, seq);
    }

    #[test]
    fn validity_matches_distinct_cells(indices in prop::collection::vec(0usize..54, 0..12)) {
        let mut seq = MoveSequence::empty();
        for &i in &indices {
            let player = if i < 27 { Player::X } else { Player::O };
            seq.push(Symbol::new(i % 27, player)).unwrap();
        }
        let cells: HashSet<usize> = indices.iter().map(|i| i % 27).collect();
        let kept = validity_filter(vec![seq]);
        prop_assert_eq!(kept.len() == 1, cells.len() == indices.len());
    }

    #[test]
    fn canonicalizing_twice_is_a_fixed_point(batch in prop::collection::vec(game(), 1..24)) {
        let backend = backend();
        let pipeline = Pipeline::new(&backend);
        let first = pipeline.canonicalize(batch).unwrap();
        let keys: HashSet<u64> = first.survivors.iter().map(|c| c.key.raw()).collect();
        prop_assert_eq!(keys.len(), first.survivors.len());

        let again: Vec<MoveSequence> = first
            .survivors
            .iter()
            .map(|c| c.key.to_sequence().unwrap())
            .collect();
        let second = pipeline.canonicalize(again).unwrap();
        let second_keys: HashSet<u64> = second.survivors.iter().map(|c| c.key.raw()).collect();
        prop_assert_eq!(second_keys, keys);
        prop_assert_eq!(second.counts.removed_invalid, 0);
        prop_assert_eq!(second.counts.removed_permutation, 0);
        prop_assert_eq!(second.counts.removed_rotation, 0);
        for c in &second.survivors {
            prop_assert_eq!(c.code, c.key);
        }
    }
}
