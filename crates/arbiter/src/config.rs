//! 設定ファイル（TOML）
//!
//! ```toml
//! [tournament]
//! event = "dev test"
//! rounds = 2
//! concurrency = 4
//! repeat = true
//! recover = true
//! pairing = { gauntlet = { seeds = 1 } }
//!
//! [tournament.opening]
//! file = "books/8moves.epd"
//! order = "random"
//!
//! [[engine]]
//! name = "dev"
//! cmd = "./stockfish-dev"
//! options = ["Hash=16", "Threads=1"]
//! tc = "10+0.1"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::adjudication::{DrawAdjudication, ResignAdjudication};
use crate::engine::EngineConfig;
use crate::game::GameConfig;
use crate::opening::OpeningOptions;
use crate::pgn::PgnMeta;
use crate::tournament::scheduler::{DEFAULT_MAX_HANDSHAKE_FAILURES, DEFAULT_MAX_RECOVERY_ATTEMPTS};
use crate::tournament::{Pairing, ScheduleSpec, SchedulerOptions};

pub const DEFAULT_UNTIMED_MOVE_DEADLINE_MS: u64 = 60_000;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TournamentConfig {
    pub event: String,
    pub site: String,
    pub games: u32,
    pub rounds: u32,
    pub concurrency: usize,
    pub repeat: bool,
    pub recover: bool,
    pub max_recovery_attempts: u32,
    pub max_handshake_failures: u32,
    pub pairing: Pairing,
    /// 0 は無制限
    pub max_plies: u32,
    pub untimed_move_deadline_ms: u64,
    pub report_interval: u32,
    pub seed: Option<u64>,
    pub opening: Option<OpeningOptions>,
    pub pgn_out: Option<PathBuf>,
    pub jsonl_out: Option<PathBuf>,
    /// 出力ファイルを上書きせず追記する
    pub append: bool,
    pub resign: Option<ResignAdjudication>,
    pub draw: Option<DrawAdjudication>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            event: "?".to_string(),
            site: "?".to_string(),
            games: 1,
            rounds: 1,
            concurrency: 1,
            repeat: false,
            recover: false,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            max_handshake_failures: DEFAULT_MAX_HANDSHAKE_FAILURES,
            pairing: Pairing::RoundRobin,
            max_plies: 0,
            untimed_move_deadline_ms: DEFAULT_UNTIMED_MOVE_DEADLINE_MS,
            report_interval: 0,
            seed: None,
            opening: None,
            pgn_out: None,
            jsonl_out: None,
            append: false,
            resign: None,
            draw: None,
        }
    }
}

impl TournamentConfig {
    pub fn validate(&self, engines: &[EngineConfig]) -> Result<()> {
        if engines.len() < 2 {
            bail!("at least 2 engines are required (got {})", engines.len());
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.games == 0 || self.rounds == 0 {
            bail!("games and rounds must be at least 1");
        }
        if self.max_handshake_failures == 0 {
            bail!("max_handshake_failures must be at least 1");
        }
        let mut seen = HashSet::new();
        for engine in engines {
            if engine.cmd.is_empty() {
                bail!("engine `{}` has no cmd", engine.name);
            }
            if !seen.insert(engine.name.as_str()) {
                bail!("duplicate engine name: {}", engine.name);
            }
        }
        if let Pairing::Gauntlet { seeds } = self.pairing {
            if seeds == 0 || seeds >= engines.len() {
                bail!("gauntlet seeds must be between 1 and {} (got {seeds})", engines.len() - 1);
            }
        }
        Ok(())
    }

    pub fn schedule_spec(&self) -> ScheduleSpec {
        ScheduleSpec {
            rounds: self.rounds,
            games: self.games,
            repeat: self.repeat,
            pairing: self.pairing,
        }
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            max_plies: self.max_plies,
            untimed_move_deadline: Duration::from_millis(self.untimed_move_deadline_ms),
            resign: self.resign,
            draw: self.draw,
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            concurrency: self.concurrency,
            recover: self.recover,
            max_recovery_attempts: self.max_recovery_attempts,
            max_handshake_failures: self.max_handshake_failures,
            report_interval: self.report_interval,
        }
    }

    pub fn pgn_meta(&self) -> PgnMeta {
        PgnMeta {
            event: self.event.clone(),
            site: self.site.clone(),
        }
    }
}

/// 設定ファイル全体
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub tournament: TournamentConfig,
    #[serde(rename = "engine")]
    pub engines: Vec<EngineConfig>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// 設定ファイルのエンジンにコマンドラインのエンジンを加えた一覧。
    ///
    /// `each` は設定ファイルのエンジンには各自の設定の後に（上書き）、
    /// コマンドラインのエンジンには各 `spec` の前に（`spec` が優先）適用する。
    pub fn merge_engines(self, each: &str, specs: &[String]) -> Result<(TournamentConfig, Vec<EngineConfig>)> {
        let mut engines = self.engines;
        for engine in &mut engines {
            engine
                .apply_spec(each)
                .with_context(|| format!("invalid --each for engine {}", engine.name))?;
        }
        for spec in specs {
            let engine =
                EngineConfig::from_spec(each, spec).with_context(|| format!("invalid --engine {spec}"))?;
            engines.push(engine);
        }
        Ok((self.tournament, engines))
    }
}
