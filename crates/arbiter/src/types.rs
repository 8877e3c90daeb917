use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// 手番
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 評価値の種類
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ScoreKind {
    #[default]
    #[serde(rename = "cp")]
    Centipawn,
    #[serde(rename = "mate")]
    Mate,
}

impl ScoreKind {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "cp" => Some(ScoreKind::Centipawn),
            "mate" => Some(ScoreKind::Mate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreKind::Centipawn => "cp",
            ScoreKind::Mate => "mate",
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 手番側から見た評価値
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Score {
    pub kind: ScoreKind,
    pub value: i32,
}

/// 比較用 cp 値の上限。詰みはこの付近に、通常の評価値はこの範囲内に丸める。
const MATE_CP: i32 = 100_000;

impl Score {
    /// 詰みを大きな cp 値に丸めた比較用の値（常に `-MATE_CP..=MATE_CP`）
    pub fn as_cp(self) -> i32 {
        let plies = self.value.unsigned_abs().min(MATE_CP as u32 / 2) as i32;
        match self.kind {
            ScoreKind::Centipawn => self.value.clamp(-MATE_CP, MATE_CP),
            ScoreKind::Mate if self.value > 0 => MATE_CP - plies,
            ScoreKind::Mate => -MATE_CP + plies,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScoreKind::Centipawn => write!(f, "{:+.2}", f64::from(self.value) / 100.0),
            ScoreKind::Mate if self.value >= 0 => write!(f, "+M{}", self.value),
            ScoreKind::Mate => write!(f, "-M{}", self.value.unsigned_abs()),
        }
    }
}

/// 対局結果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    WhiteWin,
    BlackWin,
    Draw,
    NoResult,
}

impl GameOutcome {
    pub fn win_for(color: Color) -> Self {
        match color {
            Color::White => GameOutcome::WhiteWin,
            Color::Black => GameOutcome::BlackWin,
        }
    }

    pub fn loss_for(color: Color) -> Self {
        Self::win_for(color.opposite())
    }

    pub fn winner(self) -> Option<Color> {
        match self {
            GameOutcome::WhiteWin => Some(Color::White),
            GameOutcome::BlackWin => Some(Color::Black),
            GameOutcome::Draw | GameOutcome::NoResult => None,
        }
    }

    /// PGN の Result タグ表記
    pub fn pgn_token(self) -> &'static str {
        match self {
            GameOutcome::WhiteWin => "1-0",
            GameOutcome::BlackWin => "0-1",
            GameOutcome::Draw => "1/2-1/2",
            GameOutcome::NoResult => "*",
        }
    }
}

/// 終局理由
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "side", rename_all = "snake_case")]
pub enum Termination {
    /// エンジンが bestmove (none) を返した（詰み / ステイルメイト）
    NoLegalMove(Color),
    ResignAdjudication(Color),
    DrawAdjudication,
    MaxPlies,
    TimeForfeit(Color),
    Disconnect(Color),
    IllegalResponse(Color),
    /// 起動またはハンドシェイクに失敗し、対局を開始できなかった
    Unusable(Color),
    /// ランナー内部のエラーで打ち切った（結果なし）
    Aborted,
}

impl Termination {
    /// リカバリ対象となるクラッシュ系の終局か
    pub fn is_crash(self) -> bool {
        matches!(
            self,
            Termination::Disconnect(_)
                | Termination::IllegalResponse(_)
                | Termination::Unusable(_)
                | Termination::Aborted
        )
    }

    /// 責任のある側（クラッシュ・時間切れなど）
    pub fn culprit(self) -> Option<Color> {
        match self {
            Termination::ResignAdjudication(c)
            | Termination::TimeForfeit(c)
            | Termination::Disconnect(c)
            | Termination::IllegalResponse(c)
            | Termination::Unusable(c) => Some(c),
            Termination::NoLegalMove(_)
            | Termination::DrawAdjudication
            | Termination::MaxPlies
            | Termination::Aborted => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Termination::NoLegalMove(_) => "normal",
            Termination::ResignAdjudication(_) | Termination::DrawAdjudication => "adjudication",
            Termination::MaxPlies => "max plies",
            Termination::TimeForfeit(_) => "time forfeit",
            Termination::Disconnect(_) => "abandoned",
            Termination::IllegalResponse(_) => "illegal response",
            Termination::Unusable(_) | Termination::Aborted => "unterminated",
        }
    }

    /// PGN の末尾コメント用の説明
    pub fn describe(self) -> String {
        match self {
            Termination::NoLegalMove(c) => format!("{c} has no legal move"),
            Termination::ResignAdjudication(c) => format!("{c} resigns (adjudication)"),
            Termination::DrawAdjudication => "draw by adjudication".to_string(),
            Termination::MaxPlies => "draw by ply limit".to_string(),
            Termination::TimeForfeit(c) => format!("{c} loses on time"),
            Termination::Disconnect(c) => format!("{c} disconnects"),
            Termination::IllegalResponse(c) => format!("{c} sends a malformed response"),
            Termination::Unusable(c) => format!("{c} engine could not be started"),
            Termination::Aborted => "game aborted by an internal error".to_string(),
        }
    }
}

/// 1手ごとの記録
#[derive(Clone, Debug, Serialize)]
pub struct MoveRecord {
    #[serde(rename = "move")]
    pub mv: String,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

pub fn duration_to_millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_terminations_name_their_culprit() {
        for t in [
            Termination::Disconnect(Color::Black),
            Termination::IllegalResponse(Color::Black),
            Termination::Unusable(Color::Black),
        ] {
            assert!(t.is_crash());
            assert_eq!(t.culprit(), Some(Color::Black));
        }
        assert!(!Termination::TimeForfeit(Color::White).is_crash());
        assert_eq!(Termination::MaxPlies.culprit(), None);
        assert!(Termination::Aborted.is_crash());
        assert_eq!(Termination::Aborted.culprit(), None);
    }

    #[test]
    fn score_display_and_mate_ordering() {
        let cp = Score {
            kind: ScoreKind::Centipawn,
            value: -34,
        };
        assert_eq!(cp.to_string(), "-0.34");
        let mate = Score {
            kind: ScoreKind::Mate,
            value: 3,
        };
        assert_eq!(mate.to_string(), "+M3");
        assert!(mate.as_cp() > 10_000);
        assert_eq!(GameOutcome::loss_for(Color::White), GameOutcome::BlackWin);
    }

    #[test]
    fn extreme_scores_stay_in_range() {
        for (kind, value) in [
            (ScoreKind::Centipawn, i32::MIN),
            (ScoreKind::Centipawn, i32::MAX),
            (ScoreKind::Mate, i32::MIN),
            (ScoreKind::Mate, i32::MAX),
        ] {
            let cp = Score { kind, value }.as_cp();
            assert!((-MATE_CP..=MATE_CP).contains(&cp), "{kind} {value} -> {cp}");
        }
        let lost = Score {
            kind: ScoreKind::Mate,
            value: i32::MIN,
        };
        assert_eq!(lost.to_string(), "-M2147483648");
        assert!(lost.as_cp() < -10_000);
    }
}
