use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

pub const PROCESS_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const PROCESS_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 再起動用に保持する起動設定
#[derive(Clone, Debug)]
struct LaunchSpec {
    program: PathBuf,
    args: Vec<String>,
    dir: Option<PathBuf>,
    name: String,
}

struct Running {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
}

/// 子プロセス1つとの行単位の入出力チャネル。
///
/// stdout は専用スレッドで行に分割して mpsc に流し、読み込み側は
/// `recv_timeout` で期限付きに待つ。同時に生きているプロセスは高々1つ。
pub struct ProcessChannel {
    running: Option<Running>,
    spec: Option<LaunchSpec>,
    timed_out: bool,
}

impl Default for ProcessChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessChannel {
    pub fn new() -> Self {
        Self {
            running: None,
            spec: None,
            timed_out: false,
        }
    }

    /// `command` をパイプ接続で起動する。既存プロセスがあれば先に終了させる。
    pub fn start(&mut self, command: impl AsRef<Path>, args: &[String], name: &str) -> Result<()> {
        self.launch(LaunchSpec {
            program: command.as_ref().to_path_buf(),
            args: args.to_vec(),
            dir: None,
            name: name.to_string(),
        })
    }

    /// 作業ディレクトリを指定して起動する。
    pub fn start_in(
        &mut self,
        dir: &Path,
        command: impl AsRef<Path>,
        args: &[String],
        name: &str,
    ) -> Result<()> {
        self.launch(LaunchSpec {
            program: command.as_ref().to_path_buf(),
            args: args.to_vec(),
            dir: Some(dir.to_path_buf()),
            name: name.to_string(),
        })
    }

    /// 直前の起動設定で起動し直す。
    pub fn restart(&mut self) -> Result<()> {
        let spec = self.spec.clone().ok_or_else(|| EngineError::Launch {
            name: String::new(),
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "channel was never started"),
        })?;
        self.launch(spec)
    }

    fn launch(&mut self, spec: LaunchSpec) -> Result<()> {
        self.kill();
        self.timed_out = false;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.dir {
            cmd.current_dir(dir);
        }
        let launch_err = |source: std::io::Error| EngineError::Launch {
            name: spec.name.clone(),
            command: spec.program.display().to_string(),
            source,
        };
        let mut child =
            cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).spawn().map_err(launch_err)?;
        let missing = |what: &str| {
            launch_err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, format!("no {what}")))
        };
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(missing("stdin"));
        };
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(missing("stdout"));
        };

        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        log::debug!("{}: started {} (pid {})", spec.name, spec.program.display(), child.id());
        self.running = Some(Running {
            child,
            stdin: BufWriter::new(stdin),
            rx,
        });
        self.spec = Some(spec);
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.spec.as_ref().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// 改行を付けて書き込む。
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        let name = self.name().to_string();
        if !self.is_alive() {
            return Err(EngineError::BrokenPipe {
                name,
                reason: "process is not running".to_string(),
            });
        }
        let Some(running) = self.running.as_mut() else {
            return Err(EngineError::BrokenPipe {
                name,
                reason: "process is not running".to_string(),
            });
        };
        log::debug!("{name} <- {text}");
        let res = running
            .stdin
            .write_all(text.as_bytes())
            .and_then(|()| running.stdin.write_all(b"\n"))
            .and_then(|()| running.stdin.flush());
        res.map_err(|e| EngineError::BrokenPipe {
            name,
            reason: e.to_string(),
        })
    }

    /// `marker` をトークンとして含む行が来るまで読む。
    ///
    /// 期限切れの場合はエラーにせず `timed_out()` を立て、それまでに読めた行を返す。
    pub fn read_until(&mut self, marker: &str, timeout: Duration) -> Result<Vec<String>> {
        self.timed_out = false;
        let name = self.name().to_string();
        let Some(running) = self.running.as_ref() else {
            return Err(EngineError::Disconnected { name });
        };

        let start = Instant::now();
        let mut lines = Vec::new();
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                self.timed_out = true;
                log::debug!("{name}: no `{marker}` within {} ms", timeout.as_millis());
                return Ok(lines);
            }
            match running.rx.recv_timeout(remaining) {
                Ok(line) => {
                    log::debug!("{name} -> {line}");
                    let done = line.split_whitespace().any(|tok| tok == marker);
                    lines.push(line);
                    if done {
                        return Ok(lines);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.timed_out = true;
                    log::debug!("{name}: no `{marker}` within {} ms", timeout.as_millis());
                    return Ok(lines);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Disconnected { name });
                }
            }
        }
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// プロセスが生きているか（ブロックしない）
    pub fn is_alive(&mut self) -> bool {
        match self.running.as_mut() {
            Some(running) => matches!(running.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// 強制終了して回収する。
    pub fn kill(&mut self) {
        if let Some(mut running) = self.running.take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
            log::debug!("{}: process killed", self.name());
        }
    }

    /// `quit` を送り、猶予内に終了しなければ強制終了する。
    pub fn quit(&mut self) {
        if !self.is_alive() {
            self.kill();
            return;
        }
        let _ = self.write_line("quit");
        let deadline = Instant::now() + PROCESS_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Some(running) = self.running.as_mut() {
                if let Ok(Some(_)) = running.child.try_wait() {
                    self.running = None;
                    return;
                }
            }
            std::thread::sleep(PROCESS_QUIT_POLL_INTERVAL);
        }
        self.kill();
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.quit();
    }
}
