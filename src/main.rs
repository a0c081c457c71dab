use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use census::{BackendChoice, ConstantTables, Enumerator, Outcome, RunConfig, RunSummary, TerminalStore};

const MIB: u64 = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about = "State-space census of 3x3x3 tic-tac-toe", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate every canonical position and store the terminal ones
    Run(RunArgs),
    /// Write the built-in rotation and win-line tables as text files
    Tables {
        /// Directory to write rotationMaps.txt and winLines.txt into
        #[arg(short, long, default_value = "tables")]
        out: PathBuf,
    },
    /// Summarize the terminal store of a finished or interrupted run
    Inspect {
        /// Output directory of a run
        dir: PathBuf,
        /// Boards to print per outcome
        #[arg(long, default_value_t = 3)]
        samples: usize,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Rotation table (24 lines of 27 cell indices); built-in when omitted
    #[arg(long)]
    rotations: Option<PathBuf>,

    /// Win-line table (one line of 3 cell indices per line); built-in when omitted
    #[arg(long)]
    win_lines: Option<PathBuf>,

    /// Output directory for terminals, frontier chunks and the checkpoint
    #[arg(short, long, default_value = "census-out")]
    out: PathBuf,

    /// Host memory ceiling for one batch, in MiB
    #[arg(long, default_value_t = 1024)]
    host_mib: u64,

    /// Device memory ceiling for one batch, in MiB
    #[arg(long, default_value_t = 256)]
    device_mib: u64,

    /// Boards at or below this ply are never line-tested
    #[arg(long, default_value_t = census::classify::DEFAULT_EARLY_EXIT_PLY)]
    early_exit_ply: usize,

    /// Stop after this ply
    #[arg(long, default_value_t = 27)]
    max_ply: usize,

    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,

    /// Worker threads (0 = one per core)
    #[arg(short = 'n', long, default_value_t = 0)]
    threads: usize,

    /// Frontier boards kept in memory before a chunk spills to disk
    #[arg(long, default_value_t = 1 << 20)]
    chunk_boards: usize,

    /// Also write terminals.txt
    #[arg(long, action = clap::ArgAction::SetTrue)]
    text: bool,

    /// Continue from checkpoint.json in the output directory
    #[arg(long, action = clap::ArgAction::SetTrue)]
    resume: bool,

    /// Keep each depth's frontier files
    #[arg(long, action = clap::ArgAction::SetTrue)]
    keep_frontier: bool,

    /// No progress bar
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    quiet: bool,

    /// Fail on data-consistency findings instead of warning
    #[arg(long, action = clap::ArgAction::SetTrue)]
    strict: bool,
}

impl RunArgs {
    fn into_config(self) -> RunConfig {
        RunConfig {
            rotation_table: self.rotations,
            win_line_table: self.win_lines,
            output_dir: self.out,
            host_budget_bytes: self.host_mib.saturating_mul(MIB),
            device_budget_bytes: self.device_mib.saturating_mul(MIB),
            early_exit_ply: self.early_exit_ply,
            max_ply: self.max_ply,
            backend: self.backend,
            threads: self.threads,
            chunk_capacity: self.chunk_boards,
            write_text: self.text,
            resume: self.resume,
            keep_frontier: self.keep_frontier,
            quiet: self.quiet,
            strict: self.strict,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => {
            let config = args.into_config();
            let out = config.output_dir.clone();
            let enumerator = Enumerator::from_config(config).context("cannot start the census")?;
            let summary = enumerator
                .run()
                .with_context(|| format!("census in '{}' failed", out.display()))?;
            print_summary(&summary);
            Ok(())
        }
        Command::Tables { out } => {
            let (rotations, win_lines) = ConstantTables::generated()
                .write_to_dir(&out)
                .context("cannot write tables")?;
            println!("wrote {}", rotations.display());
            println!("wrote {}", win_lines.display());
            Ok(())
        }
        Command::Inspect { dir, samples } => inspect(&dir, samples),
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Census summary".bold());
    if let Some(ply) = summary.resumed_after {
        println!("resumed after ply {ply}");
    }
    println!(
        "{:>4} {:>12} {:>14} {:>12} {:>10} {:>10} {:>10} {:>12}",
        "ply", "frontier", "generated", "canonical", "X wins", "O wins", "draws", "ongoing"
    );
    for depth in &summary.depths {
        println!(
            "{:>4} {:>12} {:>14} {:>12} {:>10} {:>10} {:>10} {:>12}",
            depth.ply,
            depth.frontier_in,
            depth.generated,
            depth.canonical(),
            depth.x_wins.to_string().green(),
            depth.o_wins.to_string().red(),
            depth.draws.to_string().yellow(),
            depth.ongoing
        );
    }
    let totals = summary.totals;
    println!(
        "{} {} terminal positions ({} X wins, {} O wins, {} draws) over {} depths on {} in {:.2?}",
        "total:".bold(),
        totals.terminals(),
        totals.x_wins,
        totals.o_wins,
        totals.draws,
        totals.depths,
        summary.backend,
        summary.elapsed
    );
    if let Some(usage) = summary.device {
        println!(
            "{} {} dispatches, {:.2?} on the device ({:.1}% of the run)",
            "device:".bold(),
            usage.dispatches,
            usage.busy,
            usage.percent_of(summary.elapsed)
        );
    }
    if summary.open_frontier > 0 {
        println!(
            "{} stopped at ply {} with {} ongoing boards (rerun with --resume and a higher --max-ply to continue)",
            "note:".cyan(),
            summary.final_ply,
            summary.open_frontier
        );
    }
    for warning in &summary.warnings {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
}

fn inspect(dir: &std::path::Path, samples: usize) -> Result<()> {
    let path = dir.join("terminals.bin");
    let records = TerminalStore::read_all(&path).with_context(|| format!("cannot read '{}'", path.display()))?;
    println!("{} records in {}", records.len(), path.display());
    for outcome in [Outcome::XWin, Outcome::OWin, Outcome::Draw] {
        let matching: Vec<_> = records.iter().filter(|r| r.outcome == outcome).collect();
        println!("{:>8}: {}", outcome.to_string().bold(), matching.len());
        for record in matching.iter().take(samples) {
            let sequence = record.board.to_sequence()?;
            println!("          {:<28} {}", sequence, record.board);
        }
    }
    Ok(())
}
