//! UCI エンジン同士の対局・トーナメント実行
//!
//! - `engine`: 子プロセスとの行単位の通信と UCI プロトコル
//! - `game`: 1局の進行（持ち時間・裁定・終局判定）
//! - `tournament`: 組み合わせ生成とワーカースレッドによる並列実行

pub mod adjudication;
pub mod common;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod opening;
pub mod pgn;
pub mod time_control;
pub mod tournament;
pub mod types;

pub use error::EngineError;
pub use time_control::TimeControl;
pub use types::{Color, GameOutcome, Score, ScoreKind, Termination};
