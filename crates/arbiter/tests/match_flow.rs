//! Single games between mock engines

#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::Arc;

use arbiter::adjudication::{DrawAdjudication, ResignAdjudication};
use arbiter::engine::{EngineConfig, UciEngine};
use arbiter::game::{GameConfig, GameRecord, play_game};
use arbiter::opening::{Opening, parse_position_line};
use arbiter::{Color, GameOutcome, ScoreKind, Termination, TimeControl};

use common::*;

fn started(cfg: EngineConfig) -> UciEngine {
    let mut engine = UciEngine::new(Arc::new(cfg));
    engine.start().unwrap();
    engine
}

fn play(white: EngineConfig, black: EngineConfig, opening: &Opening, config: &GameConfig) -> GameRecord {
    let mut white = started(white);
    let mut black = started(black);
    play_game(&mut white, &mut black, opening, config)
}

fn limited(max_plies: u32) -> GameConfig {
    GameConfig {
        max_plies,
        ..GameConfig::default()
    }
}

fn pair(dir: &Path, white: &str, black: &str) -> (EngineConfig, EngineConfig) {
    (mock_engine(dir, "white", white), mock_engine(dir, "black", black))
}

#[test]
fn ply_limit_ends_in_a_draw_with_full_history() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &standard(), &standard());
    let record = play(w, b, &Opening::startpos(), &limited(6));

    assert_eq!(record.outcome, GameOutcome::Draw);
    assert_eq!(record.termination, Termination::MaxPlies);
    assert_eq!(record.plies(), 6);
    let first = &record.moves[0];
    assert_eq!(first.mv, "e2e4");
    assert_eq!(first.depth, Some(3));
    assert_eq!(first.score.map(|s| (s.kind, s.value)), Some((ScoreKind::Centipawn, 20)));

    let log = received(dir.path(), "white");
    assert!(log.contains(&"ucinewgame".to_string()));
    assert!(log.contains(&"position startpos moves e2e4 e2e4".to_string()));
}

#[test]
fn opening_moves_are_sent_and_side_to_move_follows_them() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &standard(), &standard());
    let opening = parse_position_line("e2e4").unwrap();
    let record = play(w, b, &opening, &limited(1));

    assert_eq!(record.plies(), 1);
    assert!(received(dir.path(), "black").contains(&"position startpos moves e2e4".to_string()));
    assert!(!received(dir.path(), "white").iter().any(|l| l.starts_with("go")));
}

#[test]
fn crash_mid_game_is_a_disconnect_loss() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &standard(), &crash_on_go(2));
    let record = play(w, b, &Opening::startpos(), &limited(20));

    assert_eq!(record.termination, Termination::Disconnect(Color::Black));
    assert_eq!(record.outcome, GameOutcome::WhiteWin);
    assert!(record.termination.is_crash());
    assert_eq!(record.plies(), 3);
}

#[test]
fn missing_bestmove_within_the_deadline_forfeits_on_time() {
    let dir = tempfile::tempdir().unwrap();
    let (mut w, b) = pair(dir.path(), &silent_on_go(), &standard());
    w.tc = TimeControl::fixed(200);
    let record = play(w, b, &Opening::startpos(), &limited(20));

    assert_eq!(record.termination, Termination::TimeForfeit(Color::White));
    assert_eq!(record.outcome, GameOutcome::BlackWin);
    assert_eq!(record.plies(), 0);
    assert!(!record.termination.is_crash());
}

#[test]
fn untimed_engines_are_bounded_by_the_move_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &standard(), &silent_on_go());
    let config = GameConfig {
        max_plies: 20,
        untimed_move_deadline: std::time::Duration::from_millis(300),
        ..GameConfig::default()
    };
    let record = play(w, b, &Opening::startpos(), &config);
    assert_eq!(record.termination, Termination::TimeForfeit(Color::Black));
}

#[test]
fn no_move_with_mate_score_loses() {
    let dir = tempfile::tempdir().unwrap();
    let mated = replying(&["info depth 0 score mate 0", "bestmove (none)"]);
    let (w, b) = pair(dir.path(), &mated, &standard());
    let record = play(w, b, &Opening::startpos(), &limited(20));
    assert_eq!(record.termination, Termination::NoLegalMove(Color::White));
    assert_eq!(record.outcome, GameOutcome::BlackWin);
}

#[test]
fn no_move_without_mate_score_is_a_draw() {
    let dir = tempfile::tempdir().unwrap();
    let stalemate = replying(&["info depth 0 score cp 0", "bestmove (none)"]);
    let (w, b) = pair(dir.path(), &standard(), &stalemate);
    let record = play(w, b, &Opening::startpos(), &limited(20));
    assert_eq!(record.termination, Termination::NoLegalMove(Color::Black));
    assert_eq!(record.outcome, GameOutcome::Draw);
}

#[test]
fn malformed_bestmove_is_an_illegal_response() {
    let dir = tempfile::tempdir().unwrap();
    let broken = replying(&["info depth 1 score cp 5", "bestmove"]);
    let (w, b) = pair(dir.path(), &broken, &standard());
    let record = play(w, b, &Opening::startpos(), &limited(20));
    assert_eq!(record.termination, Termination::IllegalResponse(Color::White));
    assert_eq!(record.outcome, GameOutcome::BlackWin);
}

#[test]
fn hopeless_scores_trigger_resign_adjudication() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &scoring(900), &scoring(-900));
    let config = GameConfig {
        max_plies: 40,
        resign: Some(ResignAdjudication {
            move_count: 2,
            score: 500,
        }),
        ..GameConfig::default()
    };
    let record = play(w, b, &Opening::startpos(), &config);
    assert_eq!(record.termination, Termination::ResignAdjudication(Color::Black));
    assert_eq!(record.outcome, GameOutcome::WhiteWin);
    assert_eq!(record.plies(), 4);
}

#[test]
fn clocks_are_charged_per_move() {
    let dir = tempfile::tempdir().unwrap();
    let (mut w, mut b) = pair(dir.path(), &standard(), &standard());
    w.tc = TimeControl::new(60_000, 1_000, 0);
    b.tc = TimeControl::new(60_000, 1_000, 0);
    let record = play(w, b, &Opening::startpos(), &limited(4));
    assert_eq!(record.termination, Termination::MaxPlies);
    // 2手ずつ指して増加分 2 秒を得る。応答は即時なので 61 秒を超える。
    assert!(record.white_time_left > 61_000 && record.white_time_left <= 62_000);
    assert!(record.black_time_left > 61_000 && record.black_time_left <= 62_000);
}

#[test]
fn extreme_scores_do_not_break_adjudication() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &scoring(i32::MIN), &scoring(i32::MIN));
    let config = GameConfig {
        max_plies: 4,
        draw: Some(DrawAdjudication {
            move_number: 1,
            move_count: 1,
            score: 10,
        }),
        ..GameConfig::default()
    };
    let record = play(w, b, &Opening::startpos(), &config);
    assert_eq!(record.termination, Termination::MaxPlies);
    assert_eq!(record.plies(), 4);
    let score = record.moves[0].score.unwrap();
    assert_eq!((score.kind, score.value), (ScoreKind::Centipawn, i32::MIN));
}

#[test]
fn draw_adjudication_counts_moves_from_the_opening_fen() {
    let dir = tempfile::tempdir().unwrap();
    let (w, b) = pair(dir.path(), &scoring(0), &scoring(0));
    let opening = Opening {
        fen: Some("8/8/8/4k3/8/8/4K3/8 b - - 0 31".to_string()),
        moves: Vec::new(),
    };
    let config = GameConfig {
        max_plies: 10,
        draw: Some(DrawAdjudication {
            move_number: 31,
            move_count: 1,
            score: 10,
        }),
        ..GameConfig::default()
    };
    let record = play(w, b, &opening, &config);
    assert_eq!(record.termination, Termination::DrawAdjudication);
    assert_eq!(record.plies(), 2);
}
