use std::collections::BTreeMap;
use std::fmt;

use super::MatchResult;
use crate::types::{Color, GameOutcome};

/// W-L-D の集計
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Wld {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl Wld {
    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// 引き分けを 0.5 とした得点率
    pub fn score_rate(&self) -> Option<f64> {
        let games = self.games();
        (games > 0).then(|| (f64::from(self.wins) + f64::from(self.draws) * 0.5) / f64::from(games))
    }

    /// 得点率から求めた Elo 差。全勝・全敗では求まらない。
    pub fn elo(&self) -> Option<f64> {
        let wr = self.score_rate()?;
        (wr > 0.0 && wr < 1.0).then(|| -400.0 * (1.0 / wr - 1.0).log10())
    }

    fn add(&mut self, points: Points) {
        match points {
            Points::Win => self.wins += 1,
            Points::Loss => self.losses += 1,
            Points::Draw => self.draws += 1,
        }
    }
}

#[derive(Clone, Copy)]
enum Points {
    Win,
    Loss,
    Draw,
}

/// エンジン別・対戦組別の成績表
#[derive(Clone, Debug)]
pub struct ScoreTable {
    names: Vec<String>,
    totals: Vec<Wld>,
    /// (i, j) (i < j) → i から見た成績
    pairs: BTreeMap<(usize, usize), Wld>,
}

impl ScoreTable {
    pub fn new(names: Vec<String>) -> Self {
        let totals = vec![Wld::default(); names.len()];
        Self {
            names,
            totals,
            pairs: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, result: &MatchResult) {
        let (w, b) = (result.ticket.white, result.ticket.black);
        let (white_pts, black_pts) = match result.outcome {
            GameOutcome::NoResult => return,
            GameOutcome::Draw => (Points::Draw, Points::Draw),
            outcome if outcome.winner() == Some(Color::White) => (Points::Win, Points::Loss),
            _ => (Points::Loss, Points::Win),
        };
        self.totals[w].add(white_pts);
        self.totals[b].add(black_pts);
        let (key, first_pts) = if w < b { ((w, b), white_pts) } else { ((b, w), black_pts) };
        self.pairs.entry(key).or_default().add(first_pts);
    }

    pub fn total(&self, engine: usize) -> Wld {
        self.totals[engine]
    }

    /// `i` から見た `j` との対戦成績
    pub fn pair(&self, i: usize, j: usize) -> Wld {
        if i < j {
            self.pairs.get(&(i, j)).copied().unwrap_or_default()
        } else {
            let w = self.pairs.get(&(j, i)).copied().unwrap_or_default();
            Wld {
                wins: w.losses,
                losses: w.wins,
                draws: w.draws,
            }
        }
    }

    pub fn games(&self) -> u32 {
        self.pairs.values().map(Wld::games).sum()
    }
}

fn elo_str(wld: &Wld) -> String {
    wld.elo().map_or("N/A".to_string(), |e| format!("{e:+.0}"))
}

impl fmt::Display for ScoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.names.iter().map(String::len).max().unwrap_or(0).max(6);
        writeln!(f, "{:<width$} {:>6} {:>6} {:>6} {:>7} {:>6}", "Engine", "W", "L", "D", "Score", "Elo")?;
        for (name, wld) in self.names.iter().zip(&self.totals) {
            let rate = wld.score_rate().map_or("-".to_string(), |r| format!("{:.1}%", r * 100.0));
            writeln!(
                f,
                "{:<width$} {:>6} {:>6} {:>6} {:>7} {:>6}",
                name,
                wld.wins,
                wld.losses,
                wld.draws,
                rate,
                elo_str(wld)
            )?;
        }
        for (&(i, j), wld) in &self.pairs {
            if wld.games() == 0 {
                continue;
            }
            writeln!(
                f,
                "  {} vs {}: {}W-{}L-{}D | Elo: {}",
                self.names[i],
                self.names[j],
                wld.wins,
                wld.losses,
                wld.draws,
                elo_str(wld)
            )?;
        }
        Ok(())
    }
}
