//! エンジン層のエラー型
//!
//! プロセス / プロトコル境界で起こる失敗をすべて値として表現する。
//! Match はこれらを終局理由へ変換し、スケジューラまで伝播させない。

use std::io;

/// エンジンとの通信で発生するエラー
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// 実行ファイルを起動できなかった
    #[error("{name}: failed to launch `{command}`: {source}")]
    Launch {
        name: String,
        command: String,
        #[source]
        source: io::Error,
    },

    /// 書き込み先のプロセスが既に終了している
    #[error("{name}: broken pipe: {reason}")]
    BrokenPipe { name: String, reason: String },

    /// 読み込み中に stdout が閉じられた
    #[error("{name}: engine disconnected")]
    Disconnected { name: String },

    /// uci / isready のどちらにも応答しなかった
    #[error("{name}: no valid handshake (neither uciok nor readyok received)")]
    Handshake { name: String },

    /// 期限内に応答がなかった
    #[error("{name}: read timed out after {timeout_ms} ms")]
    ReadTimeout { name: String, timeout_ms: u64 },

    /// 期待したトークンが応答に含まれていない
    #[error("{name}: malformed response: expected `{expected}` in {line:?}")]
    MalformedResponse {
        name: String,
        expected: &'static str,
        line: Option<String>,
    },
}

impl EngineError {
    /// エラーの原因となったエンジン名
    pub fn engine_name(&self) -> &str {
        match self {
            EngineError::Launch { name, .. }
            | EngineError::BrokenPipe { name, .. }
            | EngineError::Disconnected { name }
            | EngineError::Handshake { name }
            | EngineError::ReadTimeout { name, .. }
            | EngineError::MalformedResponse { name, .. } => name,
        }
    }

    /// エンジンを使用不能にする起動時エラーか
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, EngineError::Launch { .. } | EngineError::Handshake { .. })
    }
}

/// エンジン層の Result
pub type Result<T> = std::result::Result<T, EngineError>;
