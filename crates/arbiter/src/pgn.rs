//! PGN 形式の棋譜出力

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::common::io::{Writer, open_writer};
use crate::tournament::{MatchResult, ResultSink};
use crate::types::{Color, MoveRecord};

const LINE_WIDTH: usize = 80;

/// 全対局で共通のタグ
#[derive(Clone, Debug)]
pub struct PgnMeta {
    pub event: String,
    pub site: String,
}

impl Default for PgnMeta {
    fn default() -> Self {
        Self {
            event: "?".to_string(),
            site: "?".to_string(),
        }
    }
}

pub struct PgnWriter {
    writer: Option<Writer>,
    meta: PgnMeta,
}

impl PgnWriter {
    /// `append` なら既存ファイルの末尾に追記する。
    pub fn create(path: &Path, append: bool, meta: PgnMeta) -> Result<Self> {
        let writer =
            open_writer(path, append).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            writer: Some(writer),
            meta,
        })
    }
}

impl ResultSink for PgnWriter {
    fn submit(&mut self, result: &MatchResult) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            anyhow::bail!("pgn writer already closed");
        };
        writer.write_all(format_game(result, &self.meta).as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn push_tag(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("[{name} \"{}\"]\n", escape(value)));
}

fn move_comment(record: &MoveRecord) -> String {
    match (record.score, record.depth) {
        (Some(score), Some(depth)) => format!("{{{score}/{depth} {}ms}}", record.elapsed_ms),
        (Some(score), None) => format!("{{{score} {}ms}}", record.elapsed_ms),
        (None, _) => format!("{{{}ms}}", record.elapsed_ms),
    }
}

/// 1局分の PGN（タグ・指し手・空行）を組み立てる。
pub fn format_game(result: &MatchResult, meta: &PgnMeta) -> String {
    let opening = &result.ticket.opening;
    let mut out = String::new();
    push_tag(&mut out, "Event", &meta.event);
    push_tag(&mut out, "Site", &meta.site);
    push_tag(&mut out, "Date", &result.started_at.format("%Y.%m.%d").to_string());
    push_tag(&mut out, "Round", &format!("{}.{}", result.ticket.round, result.ticket.game));
    push_tag(&mut out, "White", &result.white);
    push_tag(&mut out, "Black", &result.black);
    push_tag(&mut out, "Result", result.outcome.pgn_token());
    if let Some(fen) = &opening.fen {
        push_tag(&mut out, "FEN", fen);
        push_tag(&mut out, "SetUp", "1");
    }
    push_tag(&mut out, "PlyCount", &(opening.moves.len() + result.moves.len()).to_string());
    push_tag(&mut out, "Termination", result.termination.label());
    if result.white_tc == result.black_tc {
        push_tag(&mut out, "TimeControl", &result.white_tc.to_string());
    } else {
        push_tag(&mut out, "WhiteTimeControl", &result.white_tc.to_string());
        push_tag(&mut out, "BlackTimeControl", &result.black_tc.to_string());
    }
    out.push('\n');

    let mut tokens = Vec::new();
    let mut side = opening.initial_side();
    let mut number = opening.initial_move_number();
    let mut first = true;
    let book = opening.moves.iter().map(|mv| (mv.as_str(), "{book}".to_string()));
    let played = result.moves.iter().map(|r| (r.mv.as_str(), move_comment(r)));
    for (mv, comment) in book.chain(played) {
        match side {
            Color::White => tokens.push(format!("{number}.")),
            Color::Black if first => tokens.push(format!("{number}...")),
            Color::Black => {}
        }
        tokens.push(mv.to_string());
        tokens.push(comment);
        if side == Color::Black {
            number += 1;
        }
        side = side.opposite();
        first = false;
    }
    tokens.push(format!("{{{}}}", result.termination.describe()));
    tokens.push(result.outcome.pgn_token().to_string());

    let mut line = String::new();
    for token in tokens {
        if !line.is_empty() && line.len() + 1 + token.len() > LINE_WIDTH {
            out.push_str(&line);
            out.push('\n');
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&token);
    }
    out.push_str(&line);
    out.push_str("\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opening::{Opening, parse_position_line};
    use crate::time_control::TimeControl;
    use crate::tournament::MatchTicket;
    use crate::types::{GameOutcome, Score, ScoreKind, Termination};
    use chrono::{Local, TimeZone};
    use std::sync::Arc;

    fn result(opening: Opening, moves: Vec<MoveRecord>) -> MatchResult {
        MatchResult {
            ticket: MatchTicket {
                id: 0,
                round: 3,
                game: 2,
                white: 0,
                black: 1,
                opening: Arc::new(opening),
                repeat_index: 0,
                attempt: 0,
            },
            white: "Alpha \"dev\"".into(),
            black: "Beta".into(),
            white_tc: TimeControl::new(60_000, 600, 40),
            black_tc: TimeControl::new(60_000, 600, 40),
            outcome: GameOutcome::BlackWin,
            termination: Termination::TimeForfeit(Color::White),
            moves,
            started_at: Local.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap(),
        }
    }

    fn mv(m: &str, cp: Option<i32>, depth: Option<u32>) -> MoveRecord {
        MoveRecord {
            mv: m.into(),
            elapsed_ms: 150,
            score: cp.map(|value| Score {
                kind: ScoreKind::Centipawn,
                value,
            }),
            depth,
        }
    }

    #[test]
    fn tags_and_movetext() {
        let opening = parse_position_line("e2e4 e7e5").unwrap();
        let r = result(opening, vec![mv("g1f3", Some(34), Some(12)), mv("b8c6", None, None)]);
        let pgn = format_game(&r, &PgnMeta::default());

        assert!(pgn.starts_with("[Event \"?\"]\n[Site \"?\"]\n[Date \"2024.05.17\"]\n[Round \"3.2\"]\n"));
        assert!(pgn.contains("[White \"Alpha \\\"dev\\\"\"]\n"));
        assert!(pgn.contains("[Result \"0-1\"]\n"));
        assert!(pgn.contains("[PlyCount \"4\"]\n"));
        assert!(pgn.contains("[Termination \"time forfeit\"]\n"));
        assert!(pgn.contains("[TimeControl \"40/60+0.6\"]\n"));
        assert!(!pgn.contains("[FEN"));
        assert!(pgn.ends_with(
            "1. e2e4 {book} e7e5 {book} 2. g1f3 {+0.34/12 150ms} b8c6 {150ms}\n{white loses on time} 0-1\n\n"
        ));
    }

    #[test]
    fn fen_start_with_black_to_move() {
        let opening = Opening {
            fen: Some("4k3/8/8/8/8/8/4P3/4K3 b - - 0 31".into()),
            moves: Vec::new(),
        };
        let mut r = result(opening, vec![mv("e8d8", None, None), mv("e2e4", None, None)]);
        r.black_tc = TimeControl::fixed(500);
        let pgn = format_game(&r, &PgnMeta::default());

        assert!(pgn.contains("[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 31\"]\n[SetUp \"1\"]\n"));
        assert!(pgn.contains("[WhiteTimeControl \"40/60+0.6\"]\n[BlackTimeControl \"0.5/move\"]\n"));
        assert!(pgn.contains("31... e8d8 {150ms} 32. e2e4 {150ms}"));
    }

    #[test]
    fn long_games_wrap_at_line_width() {
        let moves = (0..60).map(|_| mv("a1a2", Some(0), Some(1))).collect();
        let pgn = format_game(&result(Opening::startpos(), moves), &PgnMeta::default());
        assert!(pgn.lines().all(|l| l.len() <= LINE_WIDTH));
    }

    #[test]
    fn writer_appends_games() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        for _ in 0..2 {
            let mut w = PgnWriter::create(&path, true, PgnMeta::default()).unwrap();
            w.submit(&result(Opening::startpos(), Vec::new())).unwrap();
            w.finish().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("[Event ").count(), 2);
    }
}
