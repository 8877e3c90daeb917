use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use super::config::EngineConfig;
use super::process::ProcessChannel;
use super::transcript::{InfoSnapshot, Transcript, value_after};
use crate::error::{EngineError, Result};
use crate::time_control::TimeControl;
use crate::types::{Color, Score, ScoreKind};

/// `uciok` などを待つ通常の読み込み期限
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1_000);
/// `uciok` が来なかった場合の `isready` 再確認の期限
pub const HANDSHAKE_FALLBACK_TIMEOUT: Duration = Duration::from_millis(60_000);

/// ハンドシェイクがどの経路で成功したか
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handshake {
    /// `uci` に `uciok` で応答した
    Acknowledged,
    /// `uciok` は無かったが `isready` に応答した（非準拠エンジン）
    ReadinessFallback,
}

/// UCI エンジン1本のラッパー。
///
/// 書き込みと読み込みは必ず要求 / 応答の対で行い、同じエンジンへの操作が
/// 重なることはない。
pub struct UciEngine {
    config: Arc<EngineConfig>,
    channel: ProcessChannel,
    transcript: Transcript,
    handshake: Option<Handshake>,
}

impl UciEngine {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            channel: ProcessChannel::new(),
            transcript: Transcript::default(),
            handshake: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn handshake(&self) -> Option<Handshake> {
        self.handshake
    }

    /// プロセスを起動し、ハンドシェイクとオプション設定を行う。
    pub fn start(&mut self) -> Result<Handshake> {
        self.handshake = None;
        let program = self.config.program();
        match &self.config.dir {
            Some(dir) => self.channel.start_in(dir, &program, &self.config.args, &self.config.name)?,
            None => self.channel.start(&program, &self.config.args, &self.config.name)?,
        }
        self.handshake_and_configure()
    }

    /// プロセスを作り直してハンドシェイクからやり直す。
    pub fn restart(&mut self) -> Result<Handshake> {
        self.handshake = None;
        self.channel.restart()?;
        self.handshake_and_configure()
    }

    fn handshake_and_configure(&mut self) -> Result<Handshake> {
        let acknowledged = self.write_command("uci").is_ok() && self.read_uci().unwrap_or(false);
        let handshake = if acknowledged {
            Handshake::Acknowledged
        } else if self.is_responsive(HANDSHAKE_FALLBACK_TIMEOUT) {
            log::warn!(
                "{}: no uciok received, engine only answered isready; treating it as usable",
                self.name()
            );
            Handshake::ReadinessFallback
        } else {
            self.channel.kill();
            return Err(EngineError::Handshake {
                name: self.config.name.clone(),
            });
        };

        let config = Arc::clone(&self.config);
        for (name, value) in config.options.iter() {
            self.write_command(&format!("setoption name {name} value {value}"))?;
        }
        self.handshake = Some(handshake);
        Ok(handshake)
    }

    fn read_uci(&mut self) -> Result<bool> {
        self.read_response("uciok", DEFAULT_READ_TIMEOUT)?;
        Ok(!self.timed_out())
    }

    /// `isready` を送り `readyok` を待つ。プロセスが死んでいれば何も書かずに false。
    pub fn is_responsive(&mut self, threshold: Duration) -> bool {
        if !self.channel.is_alive() {
            return false;
        }
        if self.write_command("isready").is_err() {
            return false;
        }
        match self.read_response("readyok", threshold) {
            Ok(_) => !self.timed_out(),
            Err(_) => false,
        }
    }

    /// `ucinewgame` を送り、ping_time 内に応答するか確認する。
    pub fn new_game(&mut self) -> bool {
        if self.write_command("ucinewgame").is_err() {
            return false;
        }
        self.is_responsive(Duration::from_millis(self.config.ping_time_ms))
    }

    pub fn position_command(&self, moves: &[String], fen: &str) -> String {
        let mut position = if fen == "startpos" {
            "position startpos".to_string()
        } else {
            format!("position fen {fen}")
        };
        if !moves.is_empty() {
            position.push_str(" moves");
            for mv in moves {
                position.push(' ');
                position.push_str(mv);
            }
        }
        position
    }

    /// `go` コマンドを組み立てる。
    ///
    /// `movetime` と持ち時間指定は併用しない。ノード数・深さ制限は常に先頭に付く。
    pub fn go_command(&self, side_to_move: Color, own: &TimeControl, opponent: &TimeControl) -> String {
        let mut input = String::from("go");
        let limits = self.config.limits;
        if limits.nodes != 0 {
            let _ = write!(input, " nodes {}", limits.nodes);
        }
        if limits.plies != 0 {
            let _ = write!(input, " depth {}", limits.plies);
        }

        if own.fixed_time != 0 {
            let _ = write!(input, " movetime {}", own.fixed_time);
            return input;
        }
        let (white, black) = match side_to_move {
            Color::White => (own, opponent),
            Color::Black => (opponent, own),
        };
        if own.time != 0 {
            let _ = write!(input, " wtime {} btime {}", white.time, black.time);
        }
        if own.increment != 0 {
            let _ = write!(input, " winc {} binc {}", white.increment, black.increment);
        }
        if own.moves_left != 0 {
            let _ = write!(input, " movestogo {}", own.moves_left);
        }
        input
    }

    /// 送信に失敗したらエンジン名付きでログを残し、そのまま返す。
    pub fn write_command(&mut self, input: &str) -> Result<()> {
        self.channel.write_line(input).inspect_err(|e| {
            log::warn!("{}: write failed, engine disconnects ({e})", self.config.name);
        })
    }

    /// `marker` が来るまで読み、トランスクリプトを差し替える。
    pub fn read_response(&mut self, marker: &str, timeout: Duration) -> Result<&Transcript> {
        match self.channel.read_until(marker, timeout) {
            Ok(lines) => {
                self.transcript = Transcript::new(lines);
                Ok(&self.transcript)
            }
            Err(e) => {
                self.transcript = Transcript::default();
                log::warn!("{}: read failed, engine disconnects ({e})", self.config.name);
                Err(e)
            }
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// 最終行の `bestmove` の直後のトークン
    pub fn best_move(&self) -> Result<String> {
        let line = self.transcript.final_line();
        line.and_then(|l| {
            let tokens: Vec<&str> = l.split_whitespace().collect();
            value_after(&tokens, "bestmove").map(str::to_string)
        })
        .ok_or_else(|| EngineError::MalformedResponse {
            name: self.config.name.clone(),
            expected: "bestmove",
            line: line.map(str::to_string),
        })
    }

    /// 最新の info 行のトークン列（まだ無ければ空）
    pub fn last_info(&self) -> Vec<&str> {
        self.transcript
            .final_info_line()
            .map(|l| l.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn last_score_kind(&self) -> ScoreKind {
        value_after(&self.last_info(), "score").and_then(ScoreKind::parse).unwrap_or_default()
    }

    pub fn last_score(&self) -> i32 {
        let info = self.last_info();
        value_after(&info, self.last_score_kind().as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// score を含む info 行があればその評価値
    pub fn last_search_score(&self) -> Option<Score> {
        self.transcript.final_info_line().map(|_| Score {
            kind: self.last_score_kind(),
            value: self.last_score(),
        })
    }

    pub fn last_info_snapshot(&self) -> Option<InfoSnapshot> {
        self.transcript.final_info_line().map(InfoSnapshot::from_line)
    }

    pub fn timed_out(&self) -> bool {
        self.channel.timed_out()
    }

    pub fn is_alive(&mut self) -> bool {
        self.channel.is_alive()
    }

    pub fn kill(&mut self) {
        self.channel.kill();
    }

    pub fn quit(&mut self) {
        self.channel.quit();
    }
}
