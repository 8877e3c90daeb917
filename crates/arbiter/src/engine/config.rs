use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Deserializer};

use crate::time_control::TimeControl;

/// `isready` 応答待ちの既定値 (ms)
pub const DEFAULT_PING_TIME_MS: u64 = 30_000;

/// 設定順を保ったままの UCI オプション列
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UciOptions(Vec<(String, String)>);

impl UciOptions {
    /// 同名のオプションは値だけ差し替え、位置は最初の指定のまま保つ。
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// "Name=Value" 形式を解析する
fn parse_option(opt: &str) -> anyhow::Result<(String, String)> {
    let (name, value) =
        opt.split_once('=').ok_or_else(|| anyhow!("invalid UCI option (expected Name=Value): {opt}"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("empty UCI option name: {opt}");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl<'de> Deserialize<'de> for UciOptions {
    /// TOML のテーブルは順序を保持しないため、文字列配列で受け取る。
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        let mut opts = UciOptions::default();
        for opt in raw {
            let (n, v) = parse_option(&opt).map_err(serde::de::Error::custom)?;
            opts.set(n, v);
        }
        Ok(opts)
    }
}

/// ノード数・深さ制限（0 は無制限）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    pub nodes: u64,
    pub plies: u32,
}

/// エンジン1本の定義。対局中は `Arc` で共有し、書き換えない。
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub options: UciOptions,
    #[serde(flatten)]
    pub limits: SearchLimits,
    #[serde(default = "default_ping_time")]
    pub ping_time_ms: u64,
    #[serde(default)]
    pub tc: TimeControl,
}

fn default_ping_time() -> u64 {
    DEFAULT_PING_TIME_MS
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            cmd: cmd.into(),
            args: Vec::new(),
            options: UciOptions::default(),
            limits: SearchLimits::default(),
            ping_time_ms: DEFAULT_PING_TIME_MS,
            tc: TimeControl::default(),
        }
    }

    /// 起動する実行ファイルのパス。
    ///
    /// `dir` 指定時は `dir/cmd` の絶対パス（子プロセスの作業ディレクトリも `dir`）。
    pub fn program(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => {
                let joined = dir.join(&self.cmd);
                std::path::absolute(&joined).unwrap_or(joined)
            }
            None => PathBuf::from(&self.cmd),
        }
    }

    /// `key=value` 1つを反映する。`--each` と `--engine` の両方で使う。
    pub fn apply(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let parse_err = || format!("invalid value for {key}: {value}");
        match key {
            "name" => self.name = value.to_string(),
            "cmd" => self.cmd = value.to_string(),
            "dir" => self.dir = Some(PathBuf::from(value)),
            "arg" => self.args.push(value.to_string()),
            "nodes" => self.limits.nodes = value.parse().with_context(parse_err)?,
            "plies" | "depth" => self.limits.plies = value.parse().with_context(parse_err)?,
            "ping" => self.ping_time_ms = value.parse().with_context(parse_err)?,
            "tc" => {
                let margin = self.tc.margin;
                self.tc = value.parse::<TimeControl>()?.with_margin(margin);
            }
            "st" => {
                let secs: f64 = value.parse().with_context(parse_err)?;
                if !secs.is_finite() || secs <= 0.0 {
                    bail!("{}", parse_err());
                }
                let margin = self.tc.margin;
                self.tc = TimeControl::fixed((secs * 1000.0).round() as u64).with_margin(margin);
            }
            "timemargin" => self.tc.margin = value.parse().with_context(parse_err)?,
            _ => match key.strip_prefix("option.") {
                Some(name) if !name.is_empty() => self.options.set(name, value),
                _ => bail!("unknown engine setting: {key}"),
            },
        }
        Ok(())
    }

    /// 共通設定 `each` の上に `spec` を重ねて作る。`name` の既定値は `cmd`。
    pub fn from_spec(each: &str, spec: &str) -> anyhow::Result<Self> {
        let mut cfg = EngineConfig::new("", "");
        cfg.apply_spec(each)?;
        cfg.apply_spec(spec)?;
        if cfg.cmd.is_empty() {
            bail!("engine spec without cmd: {spec}");
        }
        if cfg.name.is_empty() {
            cfg.name = cfg.cmd.clone();
        }
        Ok(cfg)
    }

    /// 空白区切りの `key=value` 列をまとめて反映する。
    pub fn apply_spec(&mut self, spec: &str) -> anyhow::Result<()> {
        for item in spec.split_whitespace() {
            let (key, value) =
                item.split_once('=').ok_or_else(|| anyhow!("expected key=value, got `{item}`"))?;
            self.apply(key, value)?;
        }
        Ok(())
    }
}

/// `name=sf cmd=./stockfish option.Hash=16 tc=10+0.1` 形式
impl FromStr for EngineConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::from_spec("", s)
    }
}
