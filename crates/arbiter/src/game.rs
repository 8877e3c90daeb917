//! 1局分の進行
//!
//! `Setup → Waiting(白/黒) → ... → Terminal` の順に状態が進む。
//! エンジン側のエラーはすべて終局理由に変換し、呼び出し元へは伝播しない。
//! 1手のやり直しは行わない（再試行はスケジューラの責務）。

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::adjudication::{Adjudicator, DrawAdjudication, ResignAdjudication, Verdict};
use crate::engine::UciEngine;
use crate::error::EngineError;
use crate::opening::Opening;
use crate::time_control::TimeControl;
use crate::types::{Color, GameOutcome, MoveRecord, ScoreKind, Termination, duration_to_millis};

/// 時間無制限の対局で bestmove を待つ既定の期限
pub const DEFAULT_UNTIMED_MOVE_DEADLINE: Duration = Duration::from_secs(60);

/// ゲーム設定
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// この手数に達したら引き分け（0 は無制限）
    pub max_plies: u32,
    pub untimed_move_deadline: Duration,
    pub resign: Option<ResignAdjudication>,
    pub draw: Option<DrawAdjudication>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_plies: 0,
            untimed_move_deadline: DEFAULT_UNTIMED_MOVE_DEADLINE,
            resign: None,
            draw: None,
        }
    }
}

/// 対局の状態
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchState {
    Setup,
    Waiting(Color),
    Terminal(GameOutcome, Termination),
}

/// 1局の記録
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub outcome: GameOutcome,
    pub termination: Termination,
    pub moves: Vec<MoveRecord>,
    pub started_at: DateTime<Local>,
    pub white_time_left: u64,
    pub black_time_left: u64,
}

impl GameRecord {
    pub fn plies(&self) -> usize {
        self.moves.len()
    }
}

/// 2本のエンジンで1局指す。エンジンは起動・ハンドシェイク済みであること。
pub struct Match<'a> {
    white: &'a mut UciEngine,
    black: &'a mut UciEngine,
    opening: &'a Opening,
    config: &'a GameConfig,
    white_clock: TimeControl,
    black_clock: TimeControl,
    state: MatchState,
    history: Vec<String>,
    moves: Vec<MoveRecord>,
    adjudicator: Adjudicator,
}

impl<'a> Match<'a> {
    pub fn new(
        white: &'a mut UciEngine,
        black: &'a mut UciEngine,
        opening: &'a Opening,
        config: &'a GameConfig,
    ) -> Self {
        let white_clock = white.config().tc;
        let black_clock = black.config().tc;
        Self {
            white,
            black,
            opening,
            config,
            white_clock,
            black_clock,
            state: MatchState::Setup,
            history: opening.moves.clone(),
            moves: Vec::new(),
            adjudicator: Adjudicator::new(config.resign, config.draw),
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// 終局まで進めて記録を返す。
    pub fn play(mut self) -> GameRecord {
        let started_at = Local::now();
        while !matches!(self.state, MatchState::Terminal(..)) {
            self.state = self.step();
        }
        let MatchState::Terminal(outcome, termination) = self.state else {
            unreachable!("loop exits only in a terminal state");
        };
        log::debug!(
            "{} vs {}: {} ({})",
            self.white.name(),
            self.black.name(),
            outcome.pgn_token(),
            termination.describe()
        );
        GameRecord {
            outcome,
            termination,
            moves: self.moves,
            started_at,
            white_time_left: self.white_clock.time,
            black_time_left: self.black_clock.time,
        }
    }

    fn step(&mut self) -> MatchState {
        match self.state {
            MatchState::Setup => self.setup(),
            MatchState::Waiting(side) => self.play_ply(side),
            terminal @ MatchState::Terminal(..) => terminal,
        }
    }

    fn setup(&mut self) -> MatchState {
        for side in [Color::White, Color::Black] {
            if !self.engine(side).new_game() {
                log::warn!("{}: not responsive after ucinewgame", self.engine(side).name());
                return terminal_loss(side, Termination::Disconnect(side));
            }
        }
        MatchState::Waiting(self.opening.side_to_move())
    }

    fn play_ply(&mut self, side: Color) -> MatchState {
        let played = self.moves.len() as u32;
        if self.config.max_plies > 0 && played >= self.config.max_plies {
            return MatchState::Terminal(GameOutcome::Draw, Termination::MaxPlies);
        }

        let (own, opp) = match side {
            Color::White => (self.white_clock, self.black_clock),
            Color::Black => (self.black_clock, self.white_clock),
        };
        let deadline = own.move_deadline(self.config.untimed_move_deadline);
        let opening = self.opening;
        let fen = opening.fen_or_startpos();
        let history = &self.history;
        let engine = match side {
            Color::White => &mut *self.white,
            Color::Black => &mut *self.black,
        };
        let position = engine.position_command(history, fen);
        let go = engine.go_command(side, &own, &opp);

        let start = Instant::now();
        let exchange = engine
            .write_command(&position)
            .and_then(|()| engine.write_command(&go))
            .and_then(|()| engine.read_response("bestmove", deadline).map(|_| ()));
        let elapsed_ms = duration_to_millis(start.elapsed());
        if let Err(e) = exchange {
            return terminal_loss(side, fault_termination(&e, side));
        }
        if engine.timed_out() {
            let e = EngineError::ReadTimeout {
                name: engine.name().to_string(),
                timeout_ms: duration_to_millis(deadline),
            };
            log::warn!("{e}");
            return terminal_loss(side, fault_termination(&e, side));
        }
        let best = match engine.best_move() {
            Ok(mv) => mv,
            Err(e) => {
                log::warn!("{e}");
                return terminal_loss(side, fault_termination(&e, side));
            }
        };

        // 指し手が無い = 詰みかステイルメイト
        if best == "(none)" || best == "0000" {
            return if engine.last_score_kind() == ScoreKind::Mate {
                terminal_loss(side, Termination::NoLegalMove(side))
            } else {
                MatchState::Terminal(GameOutcome::Draw, Termination::NoLegalMove(side))
            };
        }

        let score = engine.last_search_score();
        let depth = engine.last_info_snapshot().and_then(|s| s.depth);
        let clock = match side {
            Color::White => &mut self.white_clock,
            Color::Black => &mut self.black_clock,
        };
        if !clock.update_after_move(elapsed_ms) {
            return terminal_loss(side, Termination::TimeForfeit(side));
        }

        self.history.push(best.clone());
        self.moves.push(MoveRecord {
            mv: best,
            elapsed_ms,
            score,
            depth,
        });

        let full_move = self.opening.move_number_after(self.history.len());
        match self.adjudicator.record(side, full_move, score) {
            Some(Verdict::Resign(loser)) => {
                terminal_loss(loser, Termination::ResignAdjudication(loser))
            }
            Some(Verdict::Draw) => MatchState::Terminal(GameOutcome::Draw, Termination::DrawAdjudication),
            None => MatchState::Waiting(side.opposite()),
        }
    }

    fn engine(&mut self, side: Color) -> &mut UciEngine {
        match side {
            Color::White => &mut *self.white,
            Color::Black => &mut *self.black,
        }
    }
}

fn terminal_loss(loser: Color, termination: Termination) -> MatchState {
    MatchState::Terminal(GameOutcome::loss_for(loser), termination)
}

/// エンジン層のエラーを終局理由に変換する。
pub fn fault_termination(err: &EngineError, side: Color) -> Termination {
    match err {
        EngineError::MalformedResponse { .. } => Termination::IllegalResponse(side),
        EngineError::ReadTimeout { .. } => Termination::TimeForfeit(side),
        EngineError::Launch { .. } | EngineError::Handshake { .. } => Termination::Unusable(side),
        EngineError::BrokenPipe { .. } | EngineError::Disconnected { .. } => {
            Termination::Disconnect(side)
        }
    }
}

/// 1局を実行する。
pub fn play_game(
    white: &mut UciEngine,
    black: &mut UciEngine,
    opening: &Opening,
    config: &GameConfig,
) -> GameRecord {
    Match::new(white, black, opening, config).play()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_map_to_crash_terminations() {
        let malformed = EngineError::MalformedResponse {
            name: "x".into(),
            expected: "bestmove",
            line: None,
        };
        assert_eq!(
            fault_termination(&malformed, Color::White),
            Termination::IllegalResponse(Color::White)
        );
        let gone = EngineError::Disconnected { name: "x".into() };
        let t = fault_termination(&gone, Color::Black);
        assert_eq!(t, Termination::Disconnect(Color::Black));
        assert!(t.is_crash());
    }
}
