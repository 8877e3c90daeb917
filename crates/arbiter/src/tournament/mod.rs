//! トーナメント: 組み合わせ生成・並列実行・結果の集約

pub mod output;
pub mod schedule;
pub mod scheduler;
pub mod stats;

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::game::GameRecord;
use crate::opening::Opening;
use crate::time_control::TimeControl;
use crate::types::{Color, GameOutcome, MoveRecord, Termination};

pub use output::JsonlWriter;
pub use schedule::{Pairing, ScheduleSpec, generate_schedule};
pub use scheduler::{Scheduler, SchedulerOptions, TournamentSummary};
pub use stats::ScoreTable;

/// スケジュール上の1局
#[derive(Clone, Debug)]
pub struct MatchTicket {
    /// スケジュール内で一意な ID（生成順）
    pub id: u64,
    /// 1 始まりのラウンド番号
    pub round: u32,
    /// ラウンド内の対局番号（1 始まり）
    pub game: u32,
    /// engines[white] が先手（白）
    pub white: usize,
    pub black: usize,
    pub opening: Arc<Opening>,
    /// repeat で色を入れ替えた2局目なら 1
    pub repeat_index: u8,
    /// リカバリによる再試行回数
    pub attempt: u32,
}

impl MatchTicket {
    pub fn involves(&self, engine: usize) -> bool {
        self.white == engine || self.black == engine
    }

    pub fn engine(&self, color: Color) -> usize {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

/// 完了（または放棄）した1局の結果。作成後は変更しない。
#[derive(Clone, Debug)]
pub struct MatchResult {
    pub ticket: MatchTicket,
    pub white: String,
    pub black: String,
    pub white_tc: TimeControl,
    pub black_tc: TimeControl,
    pub outcome: GameOutcome,
    pub termination: Termination,
    pub moves: Vec<MoveRecord>,
    pub started_at: DateTime<Local>,
}

impl MatchResult {
    pub fn from_record(
        ticket: MatchTicket,
        white: &str,
        black: &str,
        tcs: (TimeControl, TimeControl),
        record: GameRecord,
    ) -> Self {
        Self {
            ticket,
            white: white.to_string(),
            black: black.to_string(),
            white_tc: tcs.0,
            black_tc: tcs.1,
            outcome: record.outcome,
            termination: record.termination,
            moves: record.moves,
            started_at: record.started_at,
        }
    }

    /// 対局を始められなかった場合の結果（`culprit` 側の負け）
    pub fn unplayed(
        ticket: MatchTicket,
        white: &str,
        black: &str,
        tcs: (TimeControl, TimeControl),
        culprit: Color,
    ) -> Self {
        Self {
            ticket,
            white: white.to_string(),
            black: black.to_string(),
            white_tc: tcs.0,
            black_tc: tcs.1,
            outcome: GameOutcome::loss_for(culprit),
            termination: Termination::Unusable(culprit),
            moves: Vec::new(),
            started_at: Local::now(),
        }
    }

    /// ランナー側の異常で対局が打ち切られた場合の結果（勝敗なし）
    pub fn aborted(
        ticket: MatchTicket,
        white: &str,
        black: &str,
        tcs: (TimeControl, TimeControl),
    ) -> Self {
        Self {
            ticket,
            white: white.to_string(),
            black: black.to_string(),
            white_tc: tcs.0,
            black_tc: tcs.1,
            outcome: GameOutcome::NoResult,
            termination: Termination::Aborted,
            moves: Vec::new(),
            started_at: Local::now(),
        }
    }

    pub fn is_crash(&self) -> bool {
        self.termination.is_crash()
    }

    /// クラッシュ等の責任があるエンジンのインデックス
    pub fn culprit_engine(&self) -> Option<usize> {
        self.termination.culprit().map(|c| self.ticket.engine(c))
    }
}

/// 結果の出力先。コーディネータのスレッドからのみ、完了順に呼ばれる。
pub trait ResultSink {
    fn submit(&mut self, result: &MatchResult) -> anyhow::Result<()>;

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl ResultSink for Vec<MatchResult> {
    fn submit(&mut self, result: &MatchResult) -> anyhow::Result<()> {
        self.push(result.clone());
        Ok(())
    }
}

/// 複数の出力先へ同じ結果を配る
#[derive(Default)]
pub struct Sinks(Vec<Box<dyn ResultSink>>);

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl ResultSink + 'static) {
        self.0.push(Box::new(sink));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl ResultSink for Sinks {
    fn submit(&mut self, result: &MatchResult) -> anyhow::Result<()> {
        for sink in &mut self.0 {
            sink.submit(result)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        for sink in &mut self.0 {
            sink.finish()?;
        }
        Ok(())
    }
}
