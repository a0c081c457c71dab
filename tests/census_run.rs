use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use census::{
    BackendChoice, Enumerator, ErrorKind, MoveSequence, Outcome, RunConfig, RunSummary, TerminalRecord,
    TerminalStore, BYTES_PER_BOARD, EXPANSION_FACTOR,
};

const PER_PARENT: u64 = EXPANSION_FACTOR as u64 * BYTES_PER_BOARD;

fn config(dir: &Path, max_ply: usize) -> RunConfig {
    RunConfig {
        output_dir: dir.to_path_buf(),
        max_ply,
        backend: BackendChoice::Cpu,
        quiet: true,
        ..RunConfig::default()
    }
}

/// Tight budgets: 300-board batches and 5000-board frontier chunks.
fn tight(dir: &Path, max_ply: usize) -> RunConfig {
    RunConfig {
        host_budget_bytes: PER_PARENT * 300,
        chunk_capacity: 5000,
        ..config(dir, max_ply)
    }
}

fn run(config: RunConfig) -> RunSummary {
    Enumerator::from_config(config).unwrap().run().unwrap()
}

fn records(dir: &Path) -> Vec<TerminalRecord> {
    TerminalStore::read_all(&dir.join("terminals.bin")).unwrap()
}

fn depth_dirs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.join("frontier"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn census_through_ply_six() {
    let dir = tempfile::tempdir().unwrap();
    let summary = run(tight(dir.path(), 6));

    let canonical: Vec<u64> = summary.depths.iter().map(|d| d.canonical()).collect();
    assert_eq!(canonical, vec![4, 35, 382, 4464, 33812, 243146]);
    let generated: Vec<u64> = summary.depths.iter().map(|d| d.generated).collect();
    assert_eq!(generated, vec![27, 104, 875, 9168, 102672, 731720]);

    let ply5 = &summary.depths[4];
    assert_eq!((ply5.x_wins, ply5.o_wins, ply5.draws, ply5.ongoing), (552, 0, 0, 33260));
    let ply6 = &summary.depths[5];
    assert_eq!((ply6.x_wins, ply6.o_wins, ply6.draws, ply6.ongoing), (0, 3777, 0, 239369));
    assert!(ply6.spilled_chunks > 1);
    assert!(ply6.batches > 1);

    assert_eq!(summary.totals.terminals(), 552 + 3777);
    assert_eq!(summary.final_ply, 6);
    assert_eq!(summary.open_frontier, 239369);
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);

    let stored = records(dir.path());
    assert_eq!(stored.len(), 552 + 3777);
    let distinct: HashSet<_> = stored.iter().map(|r| r.board).collect();
    assert_eq!(distinct.len(), stored.len());
    for record in &stored {
        match record.outcome {
            Outcome::XWin => assert_eq!(record.board.ply(), 5),
            Outcome::OWin => assert_eq!(record.board.ply(), 6),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[test]
fn budgets_do_not_change_the_census() {
    let roomy = tempfile::tempdir().unwrap();
    let cramped = tempfile::tempdir().unwrap();
    let a = run(config(roomy.path(), 5));
    let b = run(RunConfig {
        host_budget_bytes: PER_PARENT * 7,
        chunk_capacity: 100,
        ..config(cramped.path(), 5)
    });

    assert_eq!(a.totals, b.totals);
    assert!(b.depths[4].batches > a.depths[4].batches);
    let left: HashSet<_> = records(roomy.path()).into_iter().collect();
    let right: HashSet<_> = records(cramped.path()).into_iter().collect();
    assert_eq!(left, right);
}

#[test]
fn text_mirror_matches_binary_store() {
    let dir = tempfile::tempdir().unwrap();
    run(RunConfig {
        write_text: true,
        ..tight(dir.path(), 5)
    });

    let stored = records(dir.path());
    let text = fs::read_to_string(dir.path().join("terminals.txt")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 552);
    assert_eq!(lines.len(), stored.len());
    for (line, record) in lines.iter().zip(&stored) {
        let (sequence, letter) = line.split_once(':').unwrap();
        assert_eq!(letter, "X");
        let sequence = MoveSequence::parse(sequence).unwrap();
        assert_eq!(sequence.ply(), 5);
        assert_eq!(sequence.signature(), record.board);
    }
}

#[test]
fn resumed_run_matches_straight_run() {
    let straight = tempfile::tempdir().unwrap();
    let expected = run(tight(straight.path(), 5));

    let split = tempfile::tempdir().unwrap();
    let first = run(tight(split.path(), 3));
    assert_eq!(first.open_frontier, 382);
    assert!(split.path().join("checkpoint.json").exists());

    let second = run(RunConfig {
        resume: true,
        ..tight(split.path(), 5)
    });
    assert_eq!(second.resumed_after, Some(3));
    assert_eq!(second.depths.len(), 2);
    assert_eq!(second.depths[0].frontier_in, 382);
    assert_eq!(second.totals, expected.totals);

    let left: HashSet<_> = records(straight.path()).into_iter().collect();
    let right: HashSet<_> = records(split.path()).into_iter().collect();
    assert_eq!(left, right);
}

#[test]
fn resume_discards_bytes_written_after_the_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    run(tight(dir.path(), 4));

    // a torn record left behind by an interrupted ply 5
    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.path().join("terminals.bin"))
        .unwrap();
    file.write_all(&[0xAB; 13]).unwrap();
    drop(file);

    let summary = run(RunConfig {
        resume: true,
        ..tight(dir.path(), 5)
    });
    assert_eq!(summary.totals.x_wins, 552);
    assert_eq!(records(dir.path()).len(), 552);
}

#[test]
fn resume_rejects_a_changed_text_setting() {
    let dir = tempfile::tempdir().unwrap();
    run(config(dir.path(), 2));
    let err = Enumerator::from_config(RunConfig {
        resume: true,
        write_text: true,
        ..config(dir.path(), 4)
    })
    .unwrap()
    .run()
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn silent_depths_warn_or_fail_when_strict() {
    let dir = tempfile::tempdir().unwrap();
    let lenient = run(RunConfig {
        early_exit_ply: 0,
        ..config(dir.path(), 2)
    });
    assert_eq!(lenient.warnings.len(), 2);

    let err = Enumerator::from_config(RunConfig {
        early_exit_ply: 0,
        strict: true,
        ..config(dir.path(), 2)
    })
    .unwrap()
    .run()
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataConsistency);
}

#[test]
fn malformed_table_stops_before_any_output() {
    let tables = tempfile::tempdir().unwrap();
    let path = tables.path().join("rotationMaps.txt");
    fs::write(&path, "0 1 2\n3 4 5\n").unwrap();

    let out = tables.path().join("out");
    let err = Enumerator::from_config(RunConfig {
        rotation_table: Some(path),
        ..config(&out, 3)
    })
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!out.exists());
}

#[test]
fn written_tables_load_back_into_an_identical_run() {
    let tables = tempfile::tempdir().unwrap();
    let (rotations, win_lines) = census::ConstantTables::generated()
        .write_to_dir(tables.path())
        .unwrap();

    let builtin = tempfile::tempdir().unwrap();
    let loaded = tempfile::tempdir().unwrap();
    let a = run(config(builtin.path(), 5));
    let b = run(RunConfig {
        rotation_table: Some(rotations),
        win_line_table: Some(win_lines),
        ..config(loaded.path(), 5)
    });
    assert_eq!(a.totals, b.totals);
}

#[test]
fn only_the_last_frontier_survives_unless_kept() {
    let dir = tempfile::tempdir().unwrap();
    run(config(dir.path(), 4));
    assert_eq!(depth_dirs(dir.path()), vec!["depth_04"]);

    let dir = tempfile::tempdir().unwrap();
    run(RunConfig {
        keep_frontier: true,
        ..config(dir.path(), 4)
    });
    assert_eq!(depth_dirs(dir.path()), vec!["depth_01", "depth_02", "depth_03", "depth_04"]);
}
