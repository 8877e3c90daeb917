use crate::types::{Score, ScoreKind};

/// 1回の読み込みサイクルで受け取った応答行。
///
/// 読み込みのたびに作り直され、追記のみ行う。末尾行は bestmove などの
/// 終端行、その手前の score 付き info 行が最新の探索情報になる。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 最後に受け取った行
    pub fn final_line(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// 終端行より前にある、score を含む最新の info 行
    pub fn final_info_line(&self) -> Option<&str> {
        let (_, before) = self.lines.split_last()?;
        before
            .iter()
            .rev()
            .map(String::as_str)
            .find(|l| is_info(l) && l.split_whitespace().any(|t| t == "score"))
    }
}

fn is_info(line: &str) -> bool {
    line.split_whitespace().next() == Some("info")
}

/// `tokens` 中で `key` の直後にあるトークン
pub fn value_after<'a>(tokens: &[&'a str], key: &str) -> Option<&'a str> {
    tokens.iter().position(|t| *t == key).and_then(|i| tokens.get(i + 1)).copied()
}

/// info 行から抽出した探索情報（multipv=1 のみ保持）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoSnapshot {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub time_ms: Option<u64>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

impl InfoSnapshot {
    pub fn from_line(line: &str) -> Self {
        let mut snap = Self::default();
        snap.update_from_line(line);
        snap
    }

    pub fn update_from_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first().copied() != Some("info") {
            return;
        }
        if value_after(&tokens, "multipv").and_then(|v| v.parse::<u32>().ok()).unwrap_or(1) != 1 {
            return;
        }
        let mut i = 1;
        while i < tokens.len() {
            let next = tokens.get(i + 1).copied();
            match tokens[i] {
                "depth" => {
                    self.depth = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "seldepth" => {
                    self.seldepth = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "nodes" => {
                    self.nodes = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "time" => {
                    self.time_ms = next.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "score" => {
                    let kind = next.and_then(ScoreKind::parse);
                    let value = tokens.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                    if let (Some(kind), Some(value)) = (kind, value) {
                        self.score = Some(Score { kind, value });
                        i += 2;
                    }
                }
                "pv" => {
                    self.pv = tokens[i + 1..].iter().map(|t| t.to_string()).collect();
                    break;
                }
                // 文字列は行末まで続く
                "string" => break,
                _ => {}
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_handle_short_transcripts() {
        let empty = Transcript::default();
        assert_eq!(empty.final_line(), None);
        assert_eq!(empty.final_info_line(), None);

        let one = Transcript::new(vec!["bestmove e2e4".into()]);
        assert_eq!(one.final_line(), Some("bestmove e2e4"));
        assert_eq!(one.final_info_line(), None);
    }

    #[test]
    fn final_info_line_skips_lines_without_score() {
        let t = Transcript::new(vec![
            "info depth 9 score cp 20".into(),
            "info depth 10 score cp 34".into(),
            "info string hashfull 12".into(),
            "bestmove e2e4 ponder e7e5".into(),
        ]);
        assert_eq!(t.final_info_line(), Some("info depth 10 score cp 34"));
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn info_snapshot_parses_primary_pv() {
        let snap = InfoSnapshot::from_line(
            "info depth 10 seldepth 12 nodes 12345 time 67 score mate -3 pv e2e4 e7e5",
        );
        assert_eq!(snap.depth, Some(10));
        assert_eq!(snap.seldepth, Some(12));
        assert_eq!(snap.nodes, Some(12_345));
        assert_eq!(snap.time_ms, Some(67));
        assert_eq!(
            snap.score,
            Some(Score {
                kind: ScoreKind::Mate,
                value: -3
            })
        );
        assert_eq!(snap.pv, vec!["e2e4".to_string(), "e7e5".to_string()]);

        // multipv != 1 は無視される
        let mut snap = snap;
        snap.update_from_line("info multipv 2 depth 20 score cp 100 pv d2d4");
        assert_eq!(snap.depth, Some(10));
    }
}
