use std::collections::HashSet;
use std::sync::Arc;

use census::canonical::{permutation_collapse, validity_filter};
use census::dedup::ShardedKeySet;
use census::{
    BackendChoice, BatchPlan, Classifier, ComputeBackend, ConstantTables, CpuBackend, Enumerator, MoveSequence,
    Outcome, PackedBoard, Pipeline, RotationTable, RunConfig, WinLineTable, BYTES_PER_BOARD, EXPANSION_FACTOR,
};
use rand_xoshiro::rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

fn seq(text: &str) -> MoveSequence {
    MoveSequence::parse(text).unwrap()
}

fn cpu() -> CpuBackend {
    CpuBackend::new(Arc::new(ConstantTables::generated()))
}

#[test]
fn empty_board_expands_to_every_symbol_once() {
    let children = cpu_expand(&[MoveSequence::empty()]);
    assert_eq!(children.len(), 27);
    let mut symbols: Vec<u8> = children
        .iter()
        .map(|c| {
            assert_eq!(c.ply(), 1);
            c.as_bytes()[0]
        })
        .collect();
    symbols.sort_unstable();
    let mut expected: Vec<u8> = (b'A'..=b'Z').chain(std::iter::once(b'.')).collect();
    expected.sort_unstable();
    assert_eq!(symbols, expected);
}

fn cpu_expand(parents: &[MoveSequence]) -> Vec<MoveSequence> {
    cpu().expand(parents).unwrap()
}

#[test]
fn reordered_x_moves_collapse() {
    let kept = permutation_collapse(vec![seq("ABC"), seq("BCA")]);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].0, seq("ABC"));
}

#[test]
fn repeated_cell_is_rejected() {
    let kept = validity_filter(vec![seq("AAB"), seq("ABC")]);
    assert_eq!(kept, vec![seq("ABC")]);
}

#[test]
fn swap_table_collapses_mirror_boards_to_smaller_code() {
    let identity: [u8; 27] = std::array::from_fn(|i| i as u8);
    let mut swap = identity;
    swap.swap(0, 1);
    let mut maps = vec![identity; 23];
    maps.push(swap);
    let rotations = RotationTable::from_maps(maps, "swap-table").unwrap();
    let tables = ConstantTables {
        rotations,
        win_lines: WinLineTable::generate(),
    };
    let backend = CpuBackend::new(Arc::new(tables));

    // X at cell 1 with O at cell 2, then the mirror with X at cell 0
    let at_one = seq("Bc");
    let at_zero = seq("Ac");
    let smaller = at_one.signature().raw().min(at_zero.signature().raw());

    let out = Pipeline::new(&backend).canonicalize(vec![at_one, at_zero]).unwrap();
    assert_eq!(out.survivors.len(), 1);
    assert_eq!(out.counts.removed_rotation, 1);
    assert_eq!(out.survivors[0].key.raw(), smaller);
    assert_eq!(out.survivors[0].sequence, at_one);
}

#[test]
fn x_line_wins_only_past_threshold() {
    let lines = WinLineTable::generate();
    let line = lines.lines()[0];
    let x: u32 = line.iter().map(|&c| 1 << c).sum();
    let spare: Vec<usize> = (0..27).filter(|c| x & (1 << c) == 0).take(2).collect();
    let o: u32 = spare.iter().map(|&c| 1 << c).sum();
    let board = PackedBoard::from_masks(x, o).unwrap();

    let classifier = Classifier::default();
    assert_eq!(classifier.classify(board, 5, &lines), Outcome::XWin);
    assert_eq!(classifier.classify(board, 4, &lines), Outcome::Ongoing);
    assert_eq!(Classifier::new(2).classify(board, 3, &lines), Outcome::XWin);
}

/// `n` distinct random boards with `ply` moves each.
fn random_frontier(n: usize, ply: usize, seed: u64) -> Vec<PackedBoard> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let mut board = PackedBoard::EMPTY;
        for _ in 0..ply {
            let empty: Vec<usize> = board.empty_cells().collect();
            let cell = empty[(rng.next_u64() % empty.len() as u64) as usize];
            board = board.with_move(cell, board.next_player());
        }
        if seen.insert(board) {
            out.push(board);
        }
    }
    out
}

#[test]
fn batched_depth_matches_single_pass() {
    let frontier = random_frontier(500, 4, 0x5eed);
    let per_parent = EXPANSION_FACTOR as u64 * BYTES_PER_BOARD;
    let host = per_parent * 64;
    let device = per_parent * 96;

    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        output_dir: dir.path().to_path_buf(),
        host_budget_bytes: host,
        device_budget_bytes: device,
        backend: BackendChoice::Cpu,
        quiet: true,
        ..RunConfig::default()
    };
    let enumerator = Enumerator::new(config, Box::new(cpu())).unwrap();
    let plan = enumerator.plan();

    let expected_batches = (500 * per_parent).div_ceil(host.min(device)) as usize;
    assert_eq!(plan.chunk_count(frontier.len()), expected_batches);
    assert_eq!(plan.batches(&frontier).count(), expected_batches);

    let seen = ShardedKeySet::new();
    let mut batched = HashSet::new();
    for batch in plan.batches(&frontier) {
        let (classified, stats) = enumerator.process_batch(batch, 5, &seen).unwrap();
        assert_eq!(stats.generated, batch.len() as u64 * 23);
        for c in classified
            .x_wins
            .iter()
            .chain(&classified.o_wins)
            .chain(&classified.draws)
            .chain(&classified.ongoing)
        {
            assert!(batched.insert(c.key), "key admitted twice across batches");
        }
    }

    let backend = cpu();
    let sequences: Vec<MoveSequence> = frontier.iter().map(|b| b.to_sequence().unwrap()).collect();
    let children = cpu_expand(&sequences);
    let single: HashSet<PackedBoard> = Pipeline::new(&backend)
        .canonicalize(children)
        .unwrap()
        .survivors
        .into_iter()
        .map(|c| c.key)
        .collect();
    assert_eq!(batched, single);
}

#[test]
fn budget_below_one_expansion_is_a_config_error() {
    let err = BatchPlan::new(
        EXPANSION_FACTOR as u64 * BYTES_PER_BOARD - 1,
        u64::MAX,
        census::BackendLimits::UNBOUNDED,
    )
    .unwrap_err();
    assert_eq!(err.kind(), census::ErrorKind::Config);
}

/// Host backend that counts every call reaching it.
struct CountingBackend {
    inner: CpuBackend,
    calls: std::sync::atomic::AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        CountingBackend {
            inner: cpu(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn tick(&self) {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl ComputeBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn limits(&self) -> census::BackendLimits {
        self.inner.limits()
    }

    fn tables(&self) -> &ConstantTables {
        self.inner.tables()
    }

    fn expand(&self, parents: &[MoveSequence]) -> census::Result<Vec<MoveSequence>> {
        self.tick();
        self.inner.expand(parents)
    }

    fn signatures(&self, batch: &[MoveSequence]) -> census::Result<Vec<PackedBoard>> {
        self.tick();
        self.inner.signatures(batch)
    }

    fn rotation_keys(&self, codes: &[PackedBoard]) -> census::Result<Vec<u64>> {
        self.tick();
        self.inner.rotation_keys(codes)
    }

    fn classify(&self, codes: &[PackedBoard], ply: usize) -> census::Result<Vec<Outcome>> {
        self.tick();
        self.inner.classify(codes, ply)
    }
}

#[test]
fn empty_and_all_invalid_batches_skip_the_backend() {
    let backend = CountingBackend::new();
    let pipeline = Pipeline::new(&backend);

    let out = pipeline.canonicalize(vec![]).unwrap();
    assert!(out.survivors.is_empty());
    assert_eq!(out.counts.input, 0);
    assert_eq!(backend.calls(), 0);

    let out = pipeline.canonicalize(vec![seq("AA")]).unwrap();
    assert!(out.survivors.is_empty());
    assert_eq!(out.counts.input, 1);
    assert_eq!(out.counts.removed_invalid, 1);
    assert_eq!(out.counts.survivors(), 0);
    assert_eq!(backend.calls(), 0);

    pipeline.canonicalize(vec![seq("AB")]).unwrap();
    assert_eq!(backend.calls(), 2);
}
