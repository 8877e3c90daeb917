use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Deserializer};

/// 1手ごとに更新される持ち時間。
///
/// `fixed_time` が 0 以外なら 1手あたりの固定思考時間を表し、
/// `time` / `increment` / `moves_to_go` より優先される。
/// 全フィールドが 0 の場合は時間無制限（ノード数・深さ制限のみ）となる。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeControl {
    /// 残り時間 (ms)
    pub time: u64,
    pub increment: u64,
    /// 何手ごとに持ち時間が補充されるか（0 なら補充なし）
    pub moves_to_go: u32,
    /// 現在のサイクルで残っている手数
    pub moves_left: u32,
    pub fixed_time: u64,
    /// 通信遅延を見込んだ許容超過時間 (ms)
    pub margin: u64,
    base_time: u64,
}

impl TimeControl {
    pub fn new(time: u64, increment: u64, moves_to_go: u32) -> Self {
        Self {
            time,
            increment,
            moves_to_go,
            moves_left: moves_to_go,
            fixed_time: 0,
            margin: 0,
            base_time: time,
        }
    }

    pub fn fixed(movetime: u64) -> Self {
        Self {
            fixed_time: movetime,
            ..Self::default()
        }
    }

    pub fn with_margin(mut self, margin: u64) -> Self {
        self.margin = margin;
        self
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_time != 0
    }

    pub fn is_untimed(&self) -> bool {
        self.fixed_time == 0 && self.base_time == 0 && self.time == 0
    }

    /// この手番の bestmove を待つ期限。
    pub fn move_deadline(&self, untimed: Duration) -> Duration {
        if self.is_fixed() {
            Duration::from_millis(self.fixed_time.saturating_add(self.margin))
        } else if self.is_untimed() {
            untimed
        } else {
            Duration::from_millis(self.time.saturating_add(self.margin))
        }
    }

    /// 指し手完了後に時計を進める。時間切れなら `false` を返す。
    pub fn update_after_move(&mut self, elapsed_ms: u64) -> bool {
        if self.is_fixed() {
            return elapsed_ms <= self.fixed_time.saturating_add(self.margin);
        }
        if self.is_untimed() {
            return true;
        }
        // インクリメント加算前に 0 以下になったら負け
        if elapsed_ms >= self.time.saturating_add(self.margin) {
            self.time = 0;
            return false;
        }
        self.time = self.time.saturating_sub(elapsed_ms).saturating_add(self.increment);

        if self.moves_to_go > 0 {
            self.moves_left = self.moves_left.saturating_sub(1);
            if self.moves_left == 0 {
                // サイクル終了: 残り時間は持ち越し、基本時間を補充する
                self.moves_left = self.moves_to_go;
                self.time = self.time.saturating_add(self.base_time);
            }
        }
        true
    }
}

/// `[moves/]seconds[+increment]` 形式 (cutechess 互換)。`inf` は無制限。
impl FromStr for TimeControl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("inf") || s.is_empty() {
            return Ok(Self::default());
        }
        let (moves, rest) = match s.split_once('/') {
            Some((m, r)) => {
                let moves: u32 =
                    m.parse().with_context(|| format!("invalid moves-to-go in time control: {s}"))?;
                (moves, r)
            }
            None => (0, s),
        };
        let (base, inc) = match rest.split_once('+') {
            Some((b, i)) => (b, Some(i)),
            None => (rest, None),
        };
        let time = seconds_to_millis(base).with_context(|| format!("invalid time control: {s}"))?;
        let increment = match inc {
            Some(i) => seconds_to_millis(i).with_context(|| format!("invalid increment: {s}"))?,
            None => 0,
        };
        if time == 0 {
            bail!("time control base time must be positive: {s}");
        }
        Ok(Self::new(time, increment, moves))
    }
}

fn seconds_to_millis(s: &str) -> anyhow::Result<u64> {
    let secs: f64 = s.trim().parse()?;
    if !secs.is_finite() || secs < 0.0 {
        bail!("negative or non-finite seconds: {s}");
    }
    Ok((secs * 1000.0).round() as u64)
}

impl fmt::Display for TimeControl {
    /// PGN の TimeControl タグ形式
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed() {
            return write!(f, "{}/move", format_seconds(self.fixed_time));
        }
        if self.is_untimed() {
            return f.write_str("-");
        }
        if self.moves_to_go > 0 {
            write!(f, "{}/", self.moves_to_go)?;
        }
        write!(f, "{}", format_seconds(self.base_time))?;
        if self.increment > 0 {
            write!(f, "+{}", format_seconds(self.increment))?;
        }
        Ok(())
    }
}

fn format_seconds(ms: u64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        let s = format!("{:.3}", ms as f64 / 1000.0);
        s.trim_end_matches('0').to_string()
    }
}

impl<'de> Deserialize<'de> for TimeControl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
