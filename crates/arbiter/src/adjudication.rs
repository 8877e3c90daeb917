use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::types::{Color, Score};

/// 自分の評価値が `-score` 以下の手を `move_count` 回続けたら投了扱い
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ResignAdjudication {
    pub move_count: u32,
    pub score: i32,
}

/// `move_number` 手目以降、両者の |評価値| が `score` 以下の手が
/// それぞれ `move_count` 回続いたら引き分け
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct DrawAdjudication {
    pub move_number: u32,
    pub move_count: u32,
    pub score: i32,
}

/// `movecount=3 score=600` 形式の `key=value` 列を読む。
fn parse_fields(spec: &str, keys: &[&str]) -> Result<Vec<i64>> {
    let mut values = vec![None; keys.len()];
    for item in spec.split_whitespace() {
        let (key, value) =
            item.split_once('=').ok_or_else(|| anyhow!("expected key=value, got `{item}`"))?;
        let Some(slot) = keys.iter().position(|k| *k == key) else {
            bail!("unknown adjudication key: {key}");
        };
        values[slot] =
            Some(value.parse::<i64>().with_context(|| format!("invalid value for {key}: {value}"))?);
    }
    keys.iter()
        .zip(values)
        .map(|(key, v)| v.ok_or_else(|| anyhow!("missing {key} in `{spec}`")))
        .collect()
}

fn narrow<T: TryFrom<i64>>(value: i64, key: &str) -> Result<T> {
    T::try_from(value).map_err(|_| anyhow!("{key} out of range: {value}"))
}

impl ResignAdjudication {
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let v = parse_fields(spec, &["movecount", "score"])?;
        Ok(Self {
            move_count: narrow(v[0], "movecount")?,
            score: narrow(v[1], "score")?,
        })
    }
}

impl DrawAdjudication {
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let v = parse_fields(spec, &["movenumber", "movecount", "score"])?;
        Ok(Self {
            move_number: narrow(v[0], "movenumber")?,
            move_count: narrow(v[1], "movecount")?,
            score: narrow(v[2], "score")?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Resign(Color),
    Draw,
}

/// 1局分の連続カウンタ
#[derive(Clone, Debug, Default)]
pub struct Adjudicator {
    resign: Option<ResignAdjudication>,
    draw: Option<DrawAdjudication>,
    losing_streak: [u32; 2],
    draw_streak: u32,
}

fn idx(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}

impl Adjudicator {
    pub fn new(resign: Option<ResignAdjudication>, draw: Option<DrawAdjudication>) -> Self {
        Self {
            resign,
            draw,
            ..Self::default()
        }
    }

    /// `side` が `full_move` 手目に指した手の評価値を記録する。
    /// 評価値が無い手は連続を途切れさせる。
    pub fn record(&mut self, side: Color, full_move: u32, score: Option<Score>) -> Option<Verdict> {
        let cp = score.map(Score::as_cp);

        if let Some(resign) = self.resign {
            let streak = &mut self.losing_streak[idx(side)];
            match cp {
                Some(v) if v <= resign.score.saturating_neg() => *streak += 1,
                _ => *streak = 0,
            }
            if resign.move_count > 0 && *streak >= resign.move_count {
                return Some(Verdict::Resign(side));
            }
        }

        if let Some(draw) = self.draw {
            match cp {
                Some(v) if full_move >= draw.move_number && v.saturating_abs() <= draw.score => {
                    self.draw_streak += 1;
                }
                _ => self.draw_streak = 0,
            }
            if draw.move_count > 0 && self.draw_streak >= draw.move_count * 2 {
                return Some(Verdict::Draw);
            }
        }
        None
    }
}
