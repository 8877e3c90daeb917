//! UCI エンジンとの通信層

pub mod config;
pub mod process;
pub mod transcript;
pub mod uci;

pub use config::{EngineConfig, SearchLimits, UciOptions};
pub use process::ProcessChannel;
pub use transcript::{InfoSnapshot, Transcript};
pub use uci::{Handshake, UciEngine};
