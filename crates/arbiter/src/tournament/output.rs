//! 1局1行の JSON Lines 出力

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::{MatchResult, ResultSink};
use crate::common::io::{Writer, open_writer};
use crate::types::{Color, GameOutcome, MoveRecord, Termination};

#[derive(Serialize)]
struct ResultLogEntry<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: u64,
    round: u32,
    game: u32,
    white: &'a str,
    black: &'a str,
    opening: String,
    outcome: GameOutcome,
    result: &'static str,
    termination: Termination,
    reason: &'static str,
    plies: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<&'a str>,
    started_at: String,
    moves: &'a [MoveRecord],
}

impl<'a> ResultLogEntry<'a> {
    fn new(result: &'a MatchResult) -> Self {
        let winner = result.outcome.winner().map(|c| match c {
            Color::White => result.white.as_str(),
            Color::Black => result.black.as_str(),
        });
        Self {
            kind: "result",
            id: result.ticket.id,
            round: result.ticket.round,
            game: result.ticket.game,
            white: &result.white,
            black: &result.black,
            opening: result.ticket.opening.describe(),
            outcome: result.outcome,
            result: result.outcome.pgn_token(),
            termination: result.termination,
            reason: result.termination.label(),
            plies: result.moves.len(),
            winner,
            started_at: result.started_at.to_rfc3339(),
            moves: &result.moves,
        }
    }
}

pub struct JsonlWriter {
    writer: Option<Writer>,
}

impl JsonlWriter {
    pub fn create(path: &Path, append: bool) -> Result<Self> {
        let writer =
            open_writer(path, append).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    fn write_json(&mut self, value: &impl Serialize) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            anyhow::bail!("jsonl writer already closed");
        };
        serde_json::to_writer(&mut *writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl ResultSink for JsonlWriter {
    fn submit(&mut self, result: &MatchResult) -> Result<()> {
        self.write_json(&ResultLogEntry::new(result))
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}
