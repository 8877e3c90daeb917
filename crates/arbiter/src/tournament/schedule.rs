use serde::Deserialize;

use super::MatchTicket;
use crate::opening::OpeningBook;

/// 組み合わせ方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pairing {
    /// 全エンジン総当たり
    #[default]
    RoundRobin,
    /// 先頭 `seeds` 本が残り全エンジンと対戦する
    Gauntlet { seeds: usize },
}

impl Pairing {
    /// 対戦するエンジン対 (i, j)。i が各対局組の1局目で白を持つ。
    pub fn pairs(self, engines: usize) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        match self {
            Pairing::RoundRobin => {
                for i in 0..engines {
                    for j in (i + 1)..engines {
                        pairs.push((i, j));
                    }
                }
            }
            Pairing::Gauntlet { seeds } => {
                for i in 0..seeds.min(engines) {
                    for j in seeds..engines {
                        pairs.push((i, j));
                    }
                }
            }
        }
        pairs
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ScheduleSpec {
    pub rounds: u32,
    /// 1ラウンド・1組あたりの開始局面数
    pub games: u32,
    /// 同じ開始局面で色を入れ替えてもう1局指す
    pub repeat: bool,
    pub pairing: Pairing,
}

/// 実行前に全対局を生成する。以後このリストは変更しない。
pub fn generate_schedule(engines: usize, spec: &ScheduleSpec, book: &mut OpeningBook) -> Vec<MatchTicket> {
    let pairs = spec.pairing.pairs(engines);
    let mut tickets = Vec::new();
    let mut id = 0u64;
    for round in 1..=spec.rounds {
        let mut game = 0u32;
        for &(a, b) in &pairs {
            for _ in 0..spec.games {
                let opening = book.next_opening();
                let legs: u8 = if spec.repeat { 2 } else { 1 };
                for repeat_index in 0..legs {
                    let (white, black) = if repeat_index == 0 { (a, b) } else { (b, a) };
                    game += 1;
                    tickets.push(MatchTicket {
                        id,
                        round,
                        game,
                        white,
                        black,
                        opening: opening.clone(),
                        repeat_index,
                        attempt: 0,
                    });
                    id += 1;
                }
            }
        }
    }
    tickets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opening::{Opening, parse_position_line};
    use std::sync::Arc;

    fn book() -> OpeningBook {
        OpeningBook::from_openings(vec![
            parse_position_line("e2e4 e7e5").unwrap(),
            parse_position_line("d2d4 d7d5").unwrap(),
            Opening::startpos(),
        ])
    }

    #[test]
    fn repeat_swaps_colors_with_the_same_opening() {
        let spec = ScheduleSpec {
            rounds: 1,
            games: 2,
            repeat: true,
            pairing: Pairing::RoundRobin,
        };
        let tickets = generate_schedule(2, &spec, &mut book());
        assert_eq!(tickets.len(), 4);
        for pair in tickets.chunks(2) {
            assert_eq!((pair[0].white, pair[0].black), (0, 1));
            assert_eq!((pair[1].white, pair[1].black), (1, 0));
            assert!(Arc::ptr_eq(&pair[0].opening, &pair[1].opening));
            assert_eq!((pair[0].repeat_index, pair[1].repeat_index), (0, 1));
        }
        assert_ne!(tickets[0].opening, tickets[2].opening);
        let ids: Vec<u64> = tickets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn round_robin_covers_every_pair_each_round() {
        let spec = ScheduleSpec {
            rounds: 2,
            games: 1,
            repeat: false,
            pairing: Pairing::RoundRobin,
        };
        let tickets = generate_schedule(4, &spec, &mut book());
        assert_eq!(tickets.len(), 12);
        assert!(tickets[..6].iter().all(|t| t.round == 1));
        assert!(tickets[6..].iter().all(|t| t.round == 2));
        assert_eq!(tickets[5].game, 6);
        assert_eq!(tickets[6].game, 1);
    }

    #[test]
    fn gauntlet_pairs_seeds_against_the_field() {
        assert_eq!(Pairing::Gauntlet { seeds: 1 }.pairs(4), vec![(0, 1), (0, 2), (0, 3)]);
        assert_eq!(Pairing::Gauntlet { seeds: 2 }.pairs(3), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn pairing_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            pairing: Pairing,
        }
        let w: Wrap = toml::from_str(r#"pairing = "round-robin""#).unwrap();
        assert_eq!(w.pairing, Pairing::RoundRobin);
        let w: Wrap = toml::from_str("pairing = { gauntlet = { seeds = 2 } }").unwrap();
        assert_eq!(w.pairing, Pairing::Gauntlet { seeds: 2 });
    }
}
