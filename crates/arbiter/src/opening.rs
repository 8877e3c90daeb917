use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::common::io::open_reader;
use crate::types::Color;

/// 開始局面。`fen` が `None` なら初期配置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    pub fen: Option<String>,
    pub moves: Vec<String>,
}

impl Opening {
    pub fn startpos() -> Self {
        Self {
            fen: None,
            moves: Vec::new(),
        }
    }

    /// `position` コマンドに渡す局面指定（`startpos` または FEN）
    pub fn fen_or_startpos(&self) -> &str {
        self.fen.as_deref().unwrap_or("startpos")
    }

    fn fen_field(&self, index: usize) -> Option<&str> {
        self.fen.as_deref().and_then(|f| f.split_whitespace().nth(index))
    }

    /// 定跡手を指す前の手番
    pub fn initial_side(&self) -> Color {
        match self.fen_field(1) {
            Some("b") => Color::Black,
            _ => Color::White,
        }
    }

    /// 開始局面の手数（FEN の第6フィールド、無ければ 1）
    pub fn initial_move_number(&self) -> u32 {
        self.fen_field(5).and_then(|v| v.parse().ok()).filter(|&n| n > 0).unwrap_or(1)
    }

    /// 開始局面から `plies` 手目（1 始まり）が属する手数
    pub fn move_number_after(&self, plies: usize) -> u32 {
        let offset = usize::from(self.initial_side() == Color::Black);
        let index = (plies.saturating_sub(1) + offset) / 2;
        self.initial_move_number().saturating_add(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// 定跡手をすべて指し終えた局面の手番
    pub fn side_to_move(&self) -> Color {
        let initial = self.initial_side();
        if self.moves.len() % 2 == 0 { initial } else { initial.opposite() }
    }

    /// `position ...` 形式の説明文字列
    pub fn describe(&self) -> String {
        let mut s = match &self.fen {
            Some(fen) => format!("position fen {fen}"),
            None => "position startpos".to_string(),
        };
        if !self.moves.is_empty() {
            s.push_str(" moves ");
            s.push_str(&self.moves.join(" "));
        }
        s
    }

    fn truncated(mut self, plies: Option<usize>) -> Self {
        if let Some(limit) = plies {
            self.moves.truncate(limit);
        }
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningFormat {
    /// 1行1局面の EPD / FEN
    #[default]
    Epd,
    /// `position startpos moves ...` 形式、または指し手列のみ
    Uci,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningOrder {
    #[default]
    Sequential,
    Random,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpeningOptions {
    pub file: PathBuf,
    #[serde(default)]
    pub format: OpeningFormat,
    #[serde(default)]
    pub order: OpeningOrder,
    /// 定跡から使う最大手数
    #[serde(default)]
    pub plies: Option<usize>,
    /// 何番目の局面から使い始めるか（1 始まり）
    #[serde(default = "default_start")]
    pub start: usize,
}

fn default_start() -> usize {
    1
}

impl OpeningOptions {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            format: OpeningFormat::default(),
            order: OpeningOrder::default(),
            plies: None,
            start: 1,
        }
    }

    /// `file=book.epd format=epd order=random plies=8 start=1` 形式を反映する。
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let mut opts = Self::new("");
        for item in spec.split_whitespace() {
            let (key, value) =
                item.split_once('=').ok_or_else(|| anyhow!("expected key=value, got `{item}`"))?;
            match key {
                "file" => opts.file = PathBuf::from(value),
                "format" => {
                    opts.format = match value {
                        "epd" => OpeningFormat::Epd,
                        "uci" => OpeningFormat::Uci,
                        _ => bail!("unsupported opening format: {value}"),
                    }
                }
                "order" => {
                    opts.order = match value {
                        "sequential" => OpeningOrder::Sequential,
                        "random" => OpeningOrder::Random,
                        _ => bail!("unsupported opening order: {value}"),
                    }
                }
                "plies" => opts.plies = Some(value.parse().context("invalid plies")?),
                "start" => opts.start = value.parse().context("invalid start")?,
                _ => bail!("unknown opening setting: {key}"),
            }
        }
        if opts.file.as_os_str().is_empty() {
            bail!("opening spec without file: {spec}");
        }
        Ok(opts)
    }
}

/// 対局ごとに開始局面を払い出す。
pub struct OpeningBook {
    entries: Vec<Arc<Opening>>,
    cursor: usize,
}

impl OpeningBook {
    /// 初期配置のみ
    pub fn startpos() -> Self {
        Self::from_openings(vec![Opening::startpos()])
    }

    pub fn from_openings(openings: Vec<Opening>) -> Self {
        Self {
            entries: openings.into_iter().map(Arc::new).collect(),
            cursor: 0,
        }
    }

    /// ファイルから読み込む。`.gz` は展開しながら読む。
    pub fn load(options: &OpeningOptions, seed: Option<u64>) -> Result<Self> {
        let reader = open_reader(&options.file)
            .with_context(|| format!("failed to open {}", options.file.display()))?;
        let mut openings = parse_openings(reader, options.format, &options.file)?;
        openings = openings.into_iter().map(|o| o.truncated(options.plies)).collect();

        if options.order == OpeningOrder::Random {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_os_rng(),
            };
            openings.shuffle(&mut rng);
        }
        let mut book = Self::from_openings(openings);
        book.cursor = options.start.saturating_sub(1) % book.entries.len();
        Ok(book)
    }

    /// 次の開始局面。末尾まで来たら先頭に戻る。
    pub fn next_opening(&mut self) -> Arc<Opening> {
        let opening = Arc::clone(&self.entries[self.cursor]);
        self.cursor = (self.cursor + 1) % self.entries.len();
        opening
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_openings(reader: Box<dyn BufRead>, format: OpeningFormat, path: &Path) -> Result<Vec<Opening>> {
    let mut openings = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parsed = match format {
            OpeningFormat::Epd => parse_epd_line(trimmed),
            OpeningFormat::Uci => parse_position_line(trimmed),
        }
        .with_context(|| format!("{}:{}: invalid opening: {trimmed}", path.display(), idx + 1))?;
        openings.push(parsed);
    }
    if openings.is_empty() {
        bail!("no usable openings found in {}", path.display());
    }
    Ok(openings)
}

/// EPD 行（盤面 手番 キャスリング アンパッサン [オペコード...]）を FEN に直す。
pub fn parse_epd_line(line: &str) -> Result<Opening> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        bail!("EPD needs at least 4 fields");
    }
    if tokens[0].split('/').count() != 8 {
        bail!("board field must have 8 ranks: {}", tokens[0]);
    }
    if !matches!(tokens[1], "w" | "b") {
        bail!("side to move must be w or b: {}", tokens[1]);
    }
    let rest = &tokens[4..];
    let numeric = |i: usize| rest.get(i).and_then(|t| t.parse::<u32>().ok());
    let opcode = |key: &str| {
        rest.iter()
            .position(|t| *t == key)
            .and_then(|i| rest.get(i + 1))
            .and_then(|t| t.trim_end_matches(';').parse::<u32>().ok())
    };
    let (halfmove, fullmove) = match (numeric(0), numeric(1)) {
        (Some(h), Some(f)) => (h, f),
        _ => (opcode("hmvc").unwrap_or(0), opcode("fmvn").unwrap_or(1)),
    };
    Ok(Opening {
        fen: Some(format!(
            "{} {} {} {} {halfmove} {fullmove}",
            tokens[0], tokens[1], tokens[2], tokens[3]
        )),
        moves: Vec::new(),
    })
}

/// `position ...` 形式、または空白区切りの指し手列をパースする。
pub fn parse_position_line(line: &str) -> Result<Opening> {
    let mut tokens = line.split_whitespace().peekable();
    if tokens.peek().is_some_and(|tok| *tok == "position") {
        tokens.next();
    }
    let fen = match tokens.peek().copied() {
        Some("startpos") => {
            tokens.next();
            None
        }
        Some("fen") => {
            tokens.next();
            let mut fields = Vec::new();
            while let Some(tok) = tokens.peek() {
                if *tok == "moves" {
                    break;
                }
                fields.push(*tok);
                tokens.next();
            }
            if fields.len() < 4 {
                bail!("fen needs at least 4 fields");
            }
            Some(fields.join(" "))
        }
        _ => None,
    };
    if tokens.peek().is_some_and(|tok| *tok == "moves") {
        tokens.next();
    }
    let moves: Vec<String> = tokens.map(str::to_string).collect();
    if let Some(bad) = moves.iter().find(|m| !looks_like_uci_move(m)) {
        bail!("not a UCI move: {bad}");
    }
    Ok(Opening { fen, moves })
}

fn looks_like_uci_move(mv: &str) -> bool {
    let b = mv.as_bytes();
    let square = |f: u8, r: u8| (b'a'..=b'h').contains(&f) && (b'1'..=b'8').contains(&r);
    match b.len() {
        4 => square(b[0], b[1]) && square(b[2], b[3]),
        5 => square(b[0], b[1]) && square(b[2], b[3]) && b"qrbn".contains(&b[4]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn move_numbers_continue_from_the_start_position() {
        let start = Opening::startpos();
        assert_eq!([1, 2, 3].map(|p| start.move_number_after(p)), [1, 1, 2]);

        let black = Opening {
            fen: Some("8/8/8/4k3/8/8/4K3/8 b - - 0 31".to_string()),
            moves: Vec::new(),
        };
        assert_eq!([1, 2, 3].map(|p| black.move_number_after(p)), [31, 32, 32]);

        let white = Opening {
            fen: Some("8/8/8/4k3/8/8/4K3/8 w - - 0 40".to_string()),
            moves: vec!["e2e3".to_string()],
        };
        assert_eq!(white.move_number_after(2), 40);
        assert_eq!(white.move_number_after(3), 41);
    }

    #[test]
    fn epd_lines_become_full_fens() {
        let o = parse_epd_line("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 hmvc 0; fmvn 1;")
            .unwrap();
        assert_eq!(
            o.fen.as_deref(),
            Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
        );
        assert_eq!(o.side_to_move(), Color::Black);

        let o = parse_epd_line("8/8/8/8/8/8/8/K6k w - - 12 40").unwrap();
        assert_eq!(o.fen.as_deref(), Some("8/8/8/8/8/8/8/K6k w - - 12 40"));
        assert_eq!((o.initial_side(), o.initial_move_number()), (Color::White, 40));
        assert_eq!(Opening::startpos().initial_move_number(), 1);
        assert!(parse_epd_line("8/8/8 w - -").is_err());
    }

    #[test]
    fn position_lines_and_bare_move_lists() {
        let o = parse_position_line("position startpos moves e2e4 e7e5 g1f3").unwrap();
        assert_eq!(o.fen, None);
        assert_eq!(o.moves.len(), 3);
        assert_eq!(o.side_to_move(), Color::Black);
        assert_eq!(o.describe(), "position startpos moves e2e4 e7e5 g1f3");

        let o = parse_position_line("d2d4 d7d5 c2c4 e7e6 b1c3 g8f6 c1g5 f8e7 e2e3 e8g8 g1f3 h7h6").unwrap();
        assert_eq!(o.moves.len(), 12);
        assert_eq!(o.side_to_move(), Color::White);

        let o = parse_position_line("position fen 8/8/8/8/8/8/4P3/K6k w - - 0 1 moves e2e4").unwrap();
        assert_eq!(o.fen_or_startpos(), "8/8/8/8/8/8/4P3/K6k w - - 0 1");
        assert_eq!(o.moves, vec!["e2e4".to_string()]);

        assert!(parse_position_line("position startpos moves e2e9").is_err());
        assert!(parse_position_line("e7e8q").is_ok());
    }

    #[test]
    fn book_cycles_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "e2e4 e7e5 g1f3").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "d2d4 d7d5").unwrap();
        drop(f);

        let mut opts = OpeningOptions::new(&path);
        opts.format = OpeningFormat::Uci;
        opts.plies = Some(2);
        opts.start = 2;
        let mut book = OpeningBook::load(&opts, None).unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(book.next_opening().moves, vec!["d2d4", "d7d5"]);
        assert_eq!(book.next_opening().moves, vec!["e2e4", "e7e5"]);
        assert_eq!(book.next_opening().moves, vec!["d2d4", "d7d5"]);
    }

    #[test]
    fn seeded_random_order_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epd");
        let mut f = std::fs::File::create(&path).unwrap();
        for i in 1..=8 {
            writeln!(f, "8/8/8/8/8/8/8/K6k w - - 0 {i}").unwrap();
        }
        drop(f);

        let mut opts = OpeningOptions::new(&path);
        opts.order = OpeningOrder::Random;
        let draw = |seed| {
            let mut book = OpeningBook::load(&opts, Some(seed)).unwrap();
            (0..8).map(|_| book.next_opening().fen.clone().unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
    }

    #[test]
    fn parses_opening_spec() {
        let o = OpeningOptions::parse_spec("file=a.epd format=uci order=random plies=6").unwrap();
        assert_eq!(o.format, OpeningFormat::Uci);
        assert_eq!(o.order, OpeningOrder::Random);
        assert_eq!(o.plies, Some(6));
        assert!(OpeningOptions::parse_spec("format=pgn file=x").is_err());
        assert!(OpeningOptions::parse_spec("order=random").is_err());
    }
}
