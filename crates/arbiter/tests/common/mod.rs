//! Mock UCI engines for integration tests
//!
//! Each mock is a POSIX shell script run through `sh`. Every line it receives
//! is appended to `<name>.log` next to the script.

#![allow(dead_code)] // Not every test file uses every helper

use std::fs;
use std::path::Path;

use arbiter::engine::EngineConfig;

pub const UCI_OK: &str = r#"    uci) echo "id name mock"; echo "uciok" ;;"#;
pub const READY_OK: &str = r#"    isready) echo "readyok" ;;"#;
pub const GO_E2E4: &str =
    r#"    go) echo "info depth 3 seldepth 4 score cp 20 nodes 100 pv e2e4"; echo "bestmove e2e4" ;;"#;

/// uci / isready / go に普通に応答する
pub fn standard() -> String {
    [UCI_OK, READY_OK, GO_E2E4].join("\n")
}

/// `go` に指定の評価値で応答する
pub fn scoring(cp: i32) -> String {
    let go = format!(r#"    go) echo "info depth 5 score cp {cp} pv a2a3"; echo "bestmove a2a3" ;;"#);
    [UCI_OK, READY_OK, go.as_str()].join("\n")
}

/// `n` 回目の `go` で異常終了する
pub fn crash_on_go(n: u32) -> String {
    let go = format!(
        r#"    go) n=$((n+1)); if [ "$n" -ge {n} ]; then exit 3; fi; echo "info depth 1 score cp 0 pv e2e4"; echo "bestmove e2e4" ;;"#
    );
    [UCI_OK, READY_OK, go.as_str()].join("\n")
}

/// `marker` が無ければ作成して最初の `go` で落ちる（プロセスをまたいで1回だけ）
pub fn crash_once(marker: &Path) -> String {
    let go = format!(
        r#"    go) if [ ! -f "{m}" ]; then : > "{m}"; exit 3; fi; echo "info depth 1 score cp 0 pv e2e4"; echo "bestmove e2e4" ;;"#,
        m = marker.display()
    );
    [UCI_OK, READY_OK, go.as_str()].join("\n")
}

/// `go` を受けても何も返さない
pub fn silent_on_go() -> String {
    [UCI_OK, READY_OK, "    go) : ;;"].join("\n")
}

/// `uciok` を返さないが `isready` には答える
pub fn no_uciok() -> String {
    [r#"    uci) echo "id name legacy" ;;"#, READY_OK, GO_E2E4].join("\n")
}

/// `go` への応答を丸ごと指定する
pub fn replying(lines: &[&str]) -> String {
    let echoes: Vec<String> = lines.iter().map(|l| format!(r#"echo "{l}""#)).collect();
    let go = format!("    go) {} ;;", echoes.join("; "));
    [UCI_OK, READY_OK, go.as_str()].join("\n")
}

fn script(log_path: &Path, handlers: &str) -> String {
    format!(
        r#"log="{log}"
n=0
while IFS= read -r line; do
  echo "$line" >> "$log"
  set -- $line
  case "$1" in
{handlers}
    quit) exit 0 ;;
  esac
done
"#,
        log = log_path.display()
    )
}

/// `dir` にスクリプトを書き、それを起動する設定を返す。
pub fn mock_engine(dir: &Path, name: &str, handlers: &str) -> EngineConfig {
    let script_path = dir.join(format!("{name}.sh"));
    let log_path = dir.join(format!("{name}.log"));
    fs::write(&script_path, script(&log_path, handlers)).expect("failed to write mock engine");
    let mut cfg = EngineConfig::new(name, "sh");
    cfg.args = vec![script_path.display().to_string()];
    cfg
}

/// 起動直後に終了するエンジン（ハンドシェイク不能）
pub fn dead_engine(dir: &Path, name: &str) -> EngineConfig {
    let script_path = dir.join(format!("{name}.sh"));
    fs::write(&script_path, "exit 0\n").expect("failed to write mock engine");
    let mut cfg = EngineConfig::new(name, "sh");
    cfg.args = vec![script_path.display().to_string()];
    cfg
}

/// 存在しない実行ファイル
pub fn missing_engine(name: &str) -> EngineConfig {
    EngineConfig::new(name, "/nonexistent/arbiter-mock-engine")
}

/// モックが受け取った行
pub fn received(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(format!("{name}.log")))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
