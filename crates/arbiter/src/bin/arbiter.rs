//! UCI エンジンのトーナメント実行
//!
//! 使用例:
//! ```bash
//! arbiter \
//!   --engine "name=dev cmd=./stockfish-dev" \
//!   --engine "name=base cmd=./stockfish-base" \
//!   --each "tc=10+0.1 option.Hash=16 option.Threads=1" \
//!   --games 50 --repeat --recover --concurrency 4 \
//!   --openings "file=books/8moves.epd order=random" \
//!   --pgnout games.pgn
//! ```
//!
//! `--config` で TOML を読み、その上にコマンドラインの指定を重ねる。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser as _;

use arbiter::adjudication::{DrawAdjudication, ResignAdjudication};
use arbiter::config::{ConfigFile, TournamentConfig};
use arbiter::opening::{OpeningBook, OpeningOptions};
use arbiter::pgn::PgnWriter;
use arbiter::tournament::{
    JsonlWriter, Pairing, Scheduler, Sinks, TournamentSummary, generate_schedule,
};

#[derive(clap::Parser, Debug)]
#[command(about = "match and tournament runner for UCI chess engines")]
struct Cli {
    /// TOML config file with [tournament] and [[engine]] tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine spec: "name=.. cmd=.. dir=.. arg=.. option.NAME=VALUE tc=.. st=.. nodes=.. plies=..
    /// timemargin=.. ping=.." (repeatable, appended after engines from --config)
    #[arg(long = "engine", num_args = 1)]
    engines: Vec<String>,

    /// Settings for every engine: applied before each --engine spec and on top of engines from --config
    #[arg(long)]
    each: Option<String>,

    /// Openings per pair and round
    #[arg(long)]
    games: Option<u32>,

    /// Number of rounds
    #[arg(long)]
    rounds: Option<u32>,

    /// Number of games played at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Play each opening twice with colors swapped
    #[arg(long)]
    repeat: bool,

    /// Requeue games that ended by a crash or a malformed response
    #[arg(long)]
    recover: bool,

    /// Gauntlet: the first N engines play every other engine
    #[arg(long, value_name = "SEEDS")]
    gauntlet: Option<usize>,

    /// Event name for the PGN Event tag
    #[arg(long)]
    event: Option<String>,

    /// Opening book: "file=.. format=epd|uci order=sequential|random plies=.. start=.."
    #[arg(long)]
    openings: Option<String>,

    /// PGN output path (.gz compresses)
    #[arg(long)]
    pgnout: Option<PathBuf>,

    /// JSON Lines output path, one record per game
    #[arg(long)]
    jsonl: Option<PathBuf>,

    /// Append to output files instead of truncating them
    #[arg(long)]
    append: bool,

    /// Draw after this many plies (0 = unlimited)
    #[arg(long)]
    max_plies: Option<u32>,

    /// bestmove deadline for engines without a time control (ms)
    #[arg(long)]
    untimed_deadline_ms: Option<u64>,

    /// Resign adjudication: "movecount=N score=CP"
    #[arg(long)]
    resign: Option<String>,

    /// Draw adjudication: "movenumber=N movecount=N score=CP"
    #[arg(long)]
    draw: Option<String>,

    /// Seed for random opening order
    #[arg(long)]
    seed: Option<u64>,

    /// Log the score table every N games
    #[arg(long)]
    report_interval: Option<u32>,
}

impl Cli {
    /// コマンドラインで指定された値だけ上書きする。
    fn apply(&self, t: &mut TournamentConfig) -> Result<()> {
        if let Some(v) = self.games {
            t.games = v;
        }
        if let Some(v) = self.rounds {
            t.rounds = v;
        }
        if let Some(v) = self.concurrency {
            t.concurrency = v;
        }
        t.repeat |= self.repeat;
        t.recover |= self.recover;
        t.append |= self.append;
        if let Some(seeds) = self.gauntlet {
            t.pairing = Pairing::Gauntlet { seeds };
        }
        if let Some(v) = &self.event {
            t.event = v.clone();
        }
        if let Some(spec) = &self.openings {
            t.opening = Some(OpeningOptions::parse_spec(spec).context("invalid --openings")?);
        }
        if let Some(v) = &self.pgnout {
            t.pgn_out = Some(v.clone());
        }
        if let Some(v) = &self.jsonl {
            t.jsonl_out = Some(v.clone());
        }
        if let Some(v) = self.max_plies {
            t.max_plies = v;
        }
        if let Some(v) = self.untimed_deadline_ms {
            t.untimed_move_deadline_ms = v;
        }
        if let Some(spec) = &self.resign {
            t.resign = Some(ResignAdjudication::parse_spec(spec).context("invalid --resign")?);
        }
        if let Some(spec) = &self.draw {
            t.draw = Some(DrawAdjudication::parse_spec(spec).context("invalid --draw")?);
        }
        if let Some(v) = self.seed {
            t.seed = Some(v);
        }
        if let Some(v) = self.report_interval {
            t.report_interval = v;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let each = cli.each.as_deref().unwrap_or_default();
    let (mut tournament, engines) = file.merge_engines(each, &cli.engines)?;
    cli.apply(&mut tournament)?;
    tournament.validate(&engines)?;

    let mut book = match &tournament.opening {
        Some(opts) => {
            let book = OpeningBook::load(opts, tournament.seed)?;
            log::info!("loaded {} openings from {}", book.len(), opts.file.display());
            book
        }
        None => OpeningBook::startpos(),
    };
    let tickets = generate_schedule(engines.len(), &tournament.schedule_spec(), &mut book);

    let mut sinks = Sinks::new();
    if let Some(path) = &tournament.pgn_out {
        sinks.push(PgnWriter::create(path, tournament.append, tournament.pgn_meta())?);
    }
    if let Some(path) = &tournament.jsonl_out {
        sinks.push(JsonlWriter::create(path, tournament.append)?);
    }
    if sinks.is_empty() {
        log::info!("no --pgnout or --jsonl given; results are only summarised");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            eprintln!("\nShutting down gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        })
        .ok();
    }

    let scheduler = Scheduler::new(engines, tournament.game_config(), tournament.scheduler_options())
        .with_shutdown(shutdown);
    let summary = scheduler.run(tickets, &mut sinks)?;
    print_summary(&tournament, &summary);
    Ok(())
}

fn print_summary(tournament: &TournamentConfig, summary: &TournamentSummary) {
    println!();
    println!("=== Tournament Complete ===");
    println!(
        "Total: {} games in {:.1}s ({} workers, peak {} live)",
        summary.games,
        summary.elapsed.as_secs_f64(),
        summary.workers,
        summary.peak_live_matches
    );
    if summary.interrupted {
        println!("Interrupted: {} games not played", summary.skipped);
    }
    if summary.requeued > 0 {
        println!("Requeued after crashes: {}", summary.requeued);
    }
    if !summary.excluded.is_empty() {
        println!("Excluded engines: {}", summary.excluded.join(", "));
    }
    if !summary.fallback_handshakes.is_empty() {
        println!("Non-compliant handshake (no uciok): {}", summary.fallback_handshakes.join(", "));
    }
    println!();
    print!("{}", summary.scores);
    for path in [&tournament.pgn_out, &tournament.jsonl_out].into_iter().flatten() {
        println!("Output: {}", path.display());
    }
    println!("===========================");
}
