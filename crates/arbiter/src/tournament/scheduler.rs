//! ワーカースレッドによる並列対局
//!
//! コーディネータ（呼び出し元スレッド）がチケットを1枚ずつ渡し、結果を完了順に
//! 受け取る。チャネルは容量 0 なので、待機中のワーカーがいる時だけ送信が成立する。
//! 結果の出力・集計はコーディネータだけが行う。

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use crossbeam_channel as chan;

use super::{MatchResult, MatchTicket, ResultSink, ScoreTable};
use crate::engine::{EngineConfig, Handshake, UciEngine};
use crate::game::{GameConfig, fault_termination, play_game};
use crate::types::Color;

pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_HANDSHAKE_FAILURES: u32 = 3;

#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    /// 同時に進行する対局数の上限
    pub concurrency: usize,
    /// クラッシュで終わった対局を再度キューに入れる
    pub recover: bool,
    pub max_recovery_attempts: u32,
    /// 起動に失敗した回数がこれに達したエンジンは以後使わない
    pub max_handshake_failures: u32,
    /// この局数ごとに途中経過を出す（0 で出さない）
    pub report_interval: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            recover: false,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            max_handshake_failures: DEFAULT_MAX_HANDSHAKE_FAILURES,
            report_interval: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TournamentSummary {
    /// 出力先へ渡した結果の数
    pub games: usize,
    pub requeued: u32,
    pub excluded: Vec<String>,
    /// `uciok` を返さず `isready` で受け入れたエンジン
    pub fallback_handshakes: Vec<String>,
    pub peak_live_matches: usize,
    pub workers: usize,
    /// 中断により指されなかった対局数
    pub skipped: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
    pub scores: ScoreTable,
}

/// 進行中の対局数と最大値
#[derive(Debug, Default)]
struct LiveGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveGauge {
    fn enter(&self) -> LiveGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        LiveGuard(self)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct LiveGuard<'a>(&'a LiveGauge);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

struct WorkerReport {
    result: MatchResult,
    /// 起動・ハンドシェイクに失敗したエンジン
    startup_failure: Option<usize>,
    fallback: Vec<usize>,
}

pub struct Scheduler {
    engines: Arc<[Arc<EngineConfig>]>,
    game: GameConfig,
    options: SchedulerOptions,
    shutdown: Arc<AtomicBool>,
}

/// コーディネータ側の状態
struct Coordinator {
    queue: VecDeque<MatchTicket>,
    total: usize,
    in_flight: usize,
    emitted: usize,
    requeued: u32,
    handshake_failures: Vec<u32>,
    excluded: Vec<bool>,
    fallback: Vec<bool>,
    interrupted: bool,
    scores: ScoreTable,
}

impl Coordinator {
    fn new(tickets: Vec<MatchTicket>, names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            total: tickets.len(),
            queue: tickets.into(),
            in_flight: 0,
            emitted: 0,
            requeued: 0,
            handshake_failures: vec![0; n],
            excluded: vec![false; n],
            fallback: vec![false; n],
            interrupted: false,
            scores: ScoreTable::new(names),
        }
    }
}

impl Scheduler {
    pub fn new(engines: Vec<EngineConfig>, game: GameConfig, options: SchedulerOptions) -> Self {
        Self {
            engines: engines.into_iter().map(Arc::new).collect(),
            game,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 外部（Ctrl-C など）から停止を指示するフラグを共有する。
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name.clone()).collect()
    }

    /// 全チケットを消化するか停止指示が出るまで対局を回す。
    pub fn run(&self, tickets: Vec<MatchTicket>, sink: &mut dyn ResultSink) -> Result<TournamentSummary> {
        let started = Instant::now();
        let mut st = Coordinator::new(tickets, self.engine_names());

        let workers = self.options.concurrency.max(1).min(st.total);
        let gauge = Arc::new(LiveGauge::default());
        let (ticket_tx, ticket_rx) = chan::bounded::<Option<MatchTicket>>(0);
        let (result_tx, result_rx) = chan::bounded::<WorkerReport>(0);

        log::info!("starting {} games on {} workers", st.total, workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let engines = Arc::clone(&self.engines);
            let game = self.game.clone();
            let gauge = Arc::clone(&gauge);
            let rx = ticket_rx.clone();
            let tx = result_tx.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("arbiter-worker-{id}"))
                    .spawn(move || worker_main(&engines, &game, &gauge, rx, tx))?,
            );
        }
        // メインスレッドは受信側・送信側の片割れを持たない
        drop(ticket_rx);
        drop(result_tx);

        let outcome = self.event_loop(&mut st, &ticket_tx, &result_rx, sink);

        // 結果待ちで止まっているワーカーを解放してから停止させる
        drop(result_rx);
        for _ in 0..workers {
            if ticket_tx.send(None).is_err() {
                break;
            }
        }
        for h in handles {
            if h.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
        outcome?;
        sink.finish()?;

        let names = self.engine_names();
        let pick = |flags: &[bool]| -> Vec<String> {
            names.iter().zip(flags).filter(|&(_, &f)| f).map(|(n, _)| n.clone()).collect()
        };
        Ok(TournamentSummary {
            games: st.emitted,
            requeued: st.requeued,
            excluded: pick(&st.excluded),
            fallback_handshakes: pick(&st.fallback),
            peak_live_matches: gauge.peak(),
            workers,
            skipped: st.queue.len(),
            interrupted: st.interrupted,
            elapsed: started.elapsed(),
            scores: st.scores,
        })
    }

    fn event_loop(
        &self,
        st: &mut Coordinator,
        ticket_tx: &chan::Sender<Option<MatchTicket>>,
        result_rx: &chan::Receiver<WorkerReport>,
        sink: &mut dyn ResultSink,
    ) -> Result<()> {
        loop {
            let stopping = self.shutdown.load(Ordering::Relaxed);
            if stopping && !st.interrupted {
                st.interrupted = true;
                log::warn!("shutdown requested; waiting for {} running games", st.in_flight);
            }
            let next = if stopping { None } else { st.queue.front().cloned() };
            match next {
                None if st.in_flight == 0 => return Ok(()),
                None => match result_rx.recv() {
                    Ok(report) => {
                        st.in_flight -= 1;
                        self.handle(st, report, sink)?;
                    }
                    Err(_) => bail!("workers exited with {} games running", st.in_flight),
                },
                Some(ticket) => {
                    chan::select! {
                        send(ticket_tx, Some(ticket)) -> res => {
                            if res.is_err() {
                                bail!("all workers exited");
                            }
                            st.queue.pop_front();
                            st.in_flight += 1;
                        }
                        recv(result_rx) -> report => {
                            let Ok(report) = report else {
                                bail!("workers exited with {} games running", st.in_flight);
                            };
                            st.in_flight -= 1;
                            self.handle(st, report, sink)?;
                        }
                    }
                }
            }
        }
    }

    fn handle(&self, st: &mut Coordinator, report: WorkerReport, sink: &mut dyn ResultSink) -> Result<()> {
        let WorkerReport {
            result,
            startup_failure,
            fallback,
        } = report;

        for idx in fallback {
            if !std::mem::replace(&mut st.fallback[idx], true) {
                log::warn!(
                    "{}: no uciok, accepted after isready (non-compliant UCI)",
                    self.engines[idx].name
                );
            }
        }
        let newly_excluded = startup_failure.and_then(|idx| self.count_startup_failure(st, idx));

        if self.should_requeue(st, &result) {
            log::warn!(
                "game #{} {} vs {}: {}; requeued (attempt {})",
                result.ticket.id,
                result.white,
                result.black,
                result.termination.describe(),
                result.ticket.attempt + 1
            );
            let mut ticket = result.ticket;
            ticket.attempt += 1;
            st.queue.push_front(ticket);
            st.requeued += 1;
        } else {
            self.emit(st, &result, sink)?;
        }

        if let Some(idx) = newly_excluded {
            let (dropped, kept): (VecDeque<_>, VecDeque<_>) =
                st.queue.drain(..).partition(|t| t.involves(idx));
            st.queue = kept;
            for ticket in dropped {
                let culprit = if ticket.white == idx { Color::White } else { Color::Black };
                let result = self.unplayed(ticket, culprit);
                self.emit(st, &result, sink)?;
            }
        }
        Ok(())
    }

    /// 除外済みのエンジンが関わる対局は再試行しない（対局中に除外された場合も含む）。
    fn should_requeue(&self, st: &Coordinator, result: &MatchResult) -> bool {
        let ticket = &result.ticket;
        result.is_crash()
            && self.options.recover
            && !st.excluded[ticket.white]
            && !st.excluded[ticket.black]
            && ticket.attempt < self.options.max_recovery_attempts
    }

    /// 失敗回数を数え、上限に達して除外したらそのインデックスを返す。
    fn count_startup_failure(&self, st: &mut Coordinator, idx: usize) -> Option<usize> {
        st.handshake_failures[idx] += 1;
        let failures = st.handshake_failures[idx];
        if st.excluded[idx] || failures < self.options.max_handshake_failures.max(1) {
            return None;
        }
        st.excluded[idx] = true;
        log::error!(
            "{}: excluded after {} failed starts; its remaining games are forfeited",
            self.engines[idx].name,
            failures
        );
        Some(idx)
    }

    fn unplayed(&self, ticket: MatchTicket, culprit: Color) -> MatchResult {
        let white = &self.engines[ticket.white];
        let black = &self.engines[ticket.black];
        MatchResult::unplayed(ticket, &white.name, &black.name, (white.tc, black.tc), culprit)
    }

    fn emit(&self, st: &mut Coordinator, result: &MatchResult, sink: &mut dyn ResultSink) -> Result<()> {
        sink.submit(result)?;
        st.scores.record(result);
        st.emitted += 1;
        log::info!(
            "[{}/{}] {} vs {}: {} ({})",
            st.emitted,
            st.total,
            result.white,
            result.black,
            result.outcome.pgn_token(),
            result.termination.describe()
        );
        let interval = self.options.report_interval as usize;
        if interval > 0 && st.emitted % interval == 0 {
            log::info!("progress after {} games:\n{}", st.emitted, st.scores);
        }
        Ok(())
    }
}

fn worker_main(
    engines: &[Arc<EngineConfig>],
    game: &GameConfig,
    gauge: &LiveGauge,
    rx: chan::Receiver<Option<MatchTicket>>,
    tx: chan::Sender<WorkerReport>,
) {
    while let Ok(Some(ticket)) = rx.recv() {
        let report = contained(engines, ticket, |t| play_ticket(engines, game, gauge, t));
        if tx.send(report).is_err() {
            break;
        }
    }
}

/// 対局中のパニックをワーカー内で止め、結果なしの打ち切りとして報告する。
fn contained(
    engines: &[Arc<EngineConfig>],
    ticket: MatchTicket,
    play: impl FnOnce(MatchTicket) -> WorkerReport,
) -> WorkerReport {
    let kept = ticket.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| play(ticket))) {
        Ok(report) => report,
        Err(_) => {
            let (white, black) = (&engines[kept.white], &engines[kept.black]);
            log::error!("game #{} {} vs {}: aborted by a panic", kept.id, white.name, black.name);
            WorkerReport {
                result: MatchResult::aborted(kept, &white.name, &black.name, (white.tc, black.tc)),
                startup_failure: None,
                fallback: Vec::new(),
            }
        }
    }
}

/// 1局ごとに両エンジンを新しく起動し、結果を返す前に終了させる。
fn play_ticket(
    engines: &[Arc<EngineConfig>],
    game: &GameConfig,
    gauge: &LiveGauge,
    ticket: MatchTicket,
) -> WorkerReport {
    let white_cfg = Arc::clone(&engines[ticket.white]);
    let black_cfg = Arc::clone(&engines[ticket.black]);
    let tcs = (white_cfg.tc, black_cfg.tc);

    let _live = gauge.enter();
    let mut white = UciEngine::new(Arc::clone(&white_cfg));
    let mut black = UciEngine::new(Arc::clone(&black_cfg));
    let mut fallback = Vec::new();

    for side in [Color::White, Color::Black] {
        let engine = match side {
            Color::White => &mut white,
            Color::Black => &mut black,
        };
        match engine.start() {
            Ok(Handshake::Acknowledged) => {}
            Ok(Handshake::ReadinessFallback) => fallback.push(ticket.engine(side)),
            Err(e) => {
                log::error!("{e}");
                let startup_failure = e.is_startup_failure().then(|| ticket.engine(side));
                let mut result =
                    MatchResult::unplayed(ticket, &white_cfg.name, &black_cfg.name, tcs, side);
                // setoption 中に落ちた場合などは通常のクラッシュとして扱う
                result.termination = fault_termination(&e, side);
                return WorkerReport {
                    result,
                    startup_failure,
                    fallback,
                };
            }
        }
    }

    let record = play_game(&mut white, &mut black, &ticket.opening, game);
    drop(white);
    drop(black);
    WorkerReport {
        result: MatchResult::from_record(ticket, &white_cfg.name, &black_cfg.name, tcs, record),
        startup_failure: None,
        fallback,
    }
}
