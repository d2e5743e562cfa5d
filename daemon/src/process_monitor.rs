use std::future::Future;
use std::ops::{Deref, DerefMut};

use chrono::Local;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::notify::{Alert, AlertSink, ProcessIdentity, Severity};
use crate::process::{Stage, TrackedProcess};
use crate::snapshot::ProcessSource;

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A previous cycle was still running; nothing was touched.
    Skipped,
    /// The process list could not be read; state was left as it was.
    SnapshotFailed,
    /// Seen running for the first time, no alert.
    Started { pid: u32 },
    /// Seen running again after a stop alert.
    Recovered { pid: u32 },
    PidChanged { from: u32, to: u32 },
    Stopped,
    Unchanged,
}

/// Holds `polling` high for as long as it lives.
struct PollingGuard<'a>(&'a mut TrackedProcess);

impl<'a> PollingGuard<'a> {
    fn acquire(process: &'a mut TrackedProcess) -> Self {
        process.polling = true;
        Self(process)
    }
}

impl Deref for PollingGuard<'_> {
    type Target = TrackedProcess;

    fn deref(&self) -> &TrackedProcess {
        self.0
    }
}

impl DerefMut for PollingGuard<'_> {
    fn deref_mut(&mut self) -> &mut TrackedProcess {
        self.0
    }
}

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.polling = false;
    }
}

/// Watches one named process: reads a snapshot from `S` each cycle and
/// reports state changes to `N`.
pub struct Tracker<S, N> {
    process: TrackedProcess,
    source: S,
    sink: N,
}

impl<S: ProcessSource, N: AlertSink> Tracker<S, N> {
    pub fn new(name: impl Into<String>, source: S, sink: N) -> Self {
        Self {
            process: TrackedProcess::new(name),
            source,
            sink,
        }
    }

    pub fn process(&self) -> &TrackedProcess {
        &self.process
    }

    /// Runs one observe-and-react cycle.
    ///
    /// The executable list is scanned in order and the first case-insensitive
    /// name match wins. A failed snapshot never counts as "stopped".
    pub fn poll(&mut self) -> PollOutcome {
        let Self {
            process,
            source,
            sink,
        } = self;
        let sink = &*sink;

        if process.is_polling() {
            info!("[monitor] Previous job in progress");
            send(
                sink,
                process,
                Severity::Info,
                "Previous tracker job in progress.".to_string(),
            );
            return PollOutcome::Skipped;
        }
        let mut process = PollingGuard::acquire(process);

        let snapshot = match source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                send(
                    sink,
                    &process,
                    Severity::Critical,
                    "Cannot gather system process list; tracker is unable to observe the system."
                        .to_string(),
                );
                error!("[monitor] Gather system process error: {e}");
                return PollOutcome::SnapshotFailed;
            }
        };

        let found = snapshot
            .iter()
            .find(|entry| process.matches(&entry.executable))
            .map(|entry| entry.pid);

        match found {
            Some(pid) if !process.is_running() => {
                let stopped_alert = process.mark_running(pid);
                info!("[monitor] Process `{}` was running at PID: `{pid}`", process.name());
                if stopped_alert.is_none() {
                    return PollOutcome::Started { pid };
                }
                let message = format!(
                    "Process `{}` was back to normal at PID: `{pid}`",
                    process.name()
                );
                send(sink, &process, Severity::Info, message);
                PollOutcome::Recovered { pid }
            }
            Some(pid) => match process.pid() {
                Some(from) if from != pid => {
                    process.mark_pid_changed(pid, Local::now());
                    let message = format!("Process `{}` PID was changed to `{pid}`", process.name());
                    warn!("[monitor] {message}");
                    send(sink, &process, Severity::Warning, message);
                    PollOutcome::PidChanged { from, to: pid }
                }
                _ => PollOutcome::Unchanged,
            },
            None if process.stage() != Stage::Stopped => {
                process.mark_stopped(Local::now());
                let message = format!("Process `{}` was stopped.", process.name());
                warn!("[monitor] {message}");
                send(sink, &process, Severity::Critical, message);
                PollOutcome::Stopped
            }
            None => PollOutcome::Unchanged,
        }
    }
}

/// Copies the current identity into an [`Alert`] and hands it off.
fn send<N: AlertSink>(sink: &N, process: &TrackedProcess, severity: Severity, message: String) {
    sink.dispatch(Alert {
        message,
        severity,
        process: ProcessIdentity {
            pid: process.pid(),
            name: process.name().to_string(),
        },
    });
    info!(
        "[notify] Send notify at {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
}

/// Polls immediately, then every `period`, until `shutdown` resolves.
///
/// Ticks that fall behind a slow cycle are delayed, not replayed in a burst.
pub async fn run<S, N, F>(tracker: &mut Tracker<S, N>, period: Duration, shutdown: F)
where
    S: ProcessSource,
    N: AlertSink,
    F: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("[monitor] Process tracker was stopped");
                break;
            }
            _ = ticker.tick() => {
                tracker.poll();
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C off Unix). If no handler can be
/// installed it logs and never resolves.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => match res {
                        Ok(()) => return,
                        Err(e) => warn!("[monitor] Failed to listen for Ctrl+C: {e}"),
                    },
                    _ = term.recv() => return,
                }
                term.recv().await;
                return;
            }
            Err(e) => warn!("[monitor] Failed to listen for SIGTERM: {e}"),
        }
    }

    if tokio::signal::ctrl_c().await.is_err() {
        warn!("[monitor] Failed to listen for Ctrl+C; only a kill will stop the tracker");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::SnapshotError;
    use crate::notify::testing::RecordingSink;
    use crate::snapshot::ProcessEntry;

    /// Replays queued snapshots; once the queue is empty it keeps returning
    /// the last successful one.
    #[derive(Default)]
    struct ScriptedSource {
        steps: VecDeque<Result<Vec<ProcessEntry>, SnapshotError>>,
        last: Vec<ProcessEntry>,
        calls: usize,
    }

    impl ScriptedSource {
        fn then(mut self, procs: &[(u32, &str)]) -> Self {
            self.steps.push_back(Ok(entries(procs)));
            self
        }

        fn then_fail(mut self) -> Self {
            self.steps
                .push_back(Err(SnapshotError::Platform("permission denied".to_string())));
            self
        }
    }

    impl ProcessSource for ScriptedSource {
        fn snapshot(&mut self) -> Result<Vec<ProcessEntry>, SnapshotError> {
            self.calls += 1;
            match self.steps.pop_front() {
                Some(Ok(procs)) => {
                    self.last = procs.clone();
                    Ok(procs)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.clone()),
            }
        }
    }

    fn entries(procs: &[(u32, &str)]) -> Vec<ProcessEntry> {
        procs
            .iter()
            .map(|&(pid, exe)| ProcessEntry {
                pid,
                parent_pid: Some(1),
                executable: exe.to_string(),
            })
            .collect()
    }

    fn tracker(source: ScriptedSource) -> Tracker<ScriptedSource, RecordingSink> {
        Tracker::new("nginx", source, RecordingSink::default())
    }

    // ── first observation ─────────────────────────────────────────────────────

    #[test]
    fn first_sighting_is_silent() {
        let mut t = tracker(ScriptedSource::default().then(&[(1, "init"), (42, "nginx")]));
        assert_eq!(t.poll(), PollOutcome::Started { pid: 42 });
        assert_eq!(t.process().stage(), Stage::Normal);
        assert_eq!(t.process().pid(), Some(42));
        assert!(t.sink.alerts().is_empty());
    }

    #[test]
    fn match_is_case_insensitive() {
        let mut t = tracker(ScriptedSource::default().then(&[(7, "NGINX")]));
        assert_eq!(t.poll(), PollOutcome::Started { pid: 7 });
    }

    #[test]
    fn first_match_wins_over_duplicates() {
        let mut t = tracker(ScriptedSource::default().then(&[(5, "nginx"), (6, "nginx")]));
        t.poll();
        assert_eq!(t.process().pid(), Some(5));
    }

    #[test]
    fn same_pid_again_is_a_no_op() {
        let mut t = tracker(ScriptedSource::default().then(&[(42, "nginx")]));
        t.poll();
        assert_eq!(t.poll(), PollOutcome::Unchanged);
        assert_eq!(t.process().stage(), Stage::Normal);
        assert!(t.sink.alerts().is_empty());
    }

    // ── stop ──────────────────────────────────────────────────────────────────

    #[test]
    fn missing_process_stops_with_one_critical_alert() {
        let mut t = tracker(
            ScriptedSource::default()
                .then(&[(42, "nginx")])
                .then(&[(1, "init")]),
        );
        t.poll();
        assert_eq!(t.poll(), PollOutcome::Stopped);
        assert_eq!(t.process().stage(), Stage::Stopped);
        assert_eq!(t.process().pid(), None);
        assert!(t.process().last_notified_at().is_some());

        let alerts = t.sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].process.pid, None);
        assert_eq!(alerts[0].process.name, "nginx");
    }

    #[test]
    fn absent_at_startup_counts_as_stopped() {
        let mut t = tracker(ScriptedSource::default().then(&[(1, "init")]));
        assert_eq!(t.poll(), PollOutcome::Stopped);
        assert_eq!(t.sink.severities(), vec![Severity::Critical]);
    }

    #[test]
    fn empty_snapshot_counts_as_no_match() {
        let mut t = tracker(ScriptedSource::default().then(&[]));
        assert_eq!(t.poll(), PollOutcome::Stopped);
    }

    #[test]
    fn repeated_absence_does_not_renotify() {
        let mut t = tracker(ScriptedSource::default().then(&[(1, "init")]));
        t.poll();
        let stopped_at = t.process().last_notified_at();

        for _ in 0..3 {
            assert_eq!(t.poll(), PollOutcome::Unchanged);
        }
        assert_eq!(t.process().stage(), Stage::Stopped);
        assert_eq!(t.process().last_notified_at(), stopped_at);
        assert_eq!(t.sink.alerts().len(), 1);
    }

    // ── recovery ──────────────────────────────────────────────────────────────

    #[test]
    fn return_after_stop_sends_one_info_alert() {
        let mut t = tracker(
            ScriptedSource::default()
                .then(&[(1, "init")])
                .then(&[(1, "init"), (77, "nginx")]),
        );
        t.poll();
        assert_eq!(t.poll(), PollOutcome::Recovered { pid: 77 });
        assert_eq!(t.process().stage(), Stage::Normal);
        assert_eq!(t.process().pid(), Some(77));
        assert!(t.process().last_notified_at().is_none());

        let alerts = t.sink.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].severity, Severity::Info);
        assert_eq!(alerts[1].process.pid, Some(77));
        assert!(alerts[1].message.contains("back to normal"));
    }

    // ── PID change ────────────────────────────────────────────────────────────

    #[test]
    fn new_pid_sends_one_warning() {
        let mut t = tracker(
            ScriptedSource::default()
                .then(&[(10, "nginx")])
                .then(&[(11, "nginx")]),
        );
        t.poll();
        assert_eq!(t.poll(), PollOutcome::PidChanged { from: 10, to: 11 });
        assert_eq!(t.process().stage(), Stage::IdentifierChanged);
        assert_eq!(t.process().pid(), Some(11));
        assert!(t.process().last_notified_at().is_some());

        let alerts = t.sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].process.pid, Some(11));
    }

    #[test]
    fn steady_after_pid_change_stays_in_changed_stage() {
        let mut t = tracker(
            ScriptedSource::default()
                .then(&[(10, "nginx")])
                .then(&[(11, "nginx")])
                .then(&[(11, "nginx")]),
        );
        t.poll();
        t.poll();
        assert_eq!(t.poll(), PollOutcome::Unchanged);
        assert_eq!(t.process().stage(), Stage::IdentifierChanged);
        assert_eq!(t.sink.alerts().len(), 1);
    }

    #[test]
    fn stop_after_pid_change_then_return_recovers() {
        let mut t = tracker(
            ScriptedSource::default()
                .then(&[(10, "nginx")])
                .then(&[(11, "nginx")])
                .then(&[])
                .then(&[(12, "nginx")]),
        );
        for _ in 0..4 {
            t.poll();
        }
        assert_eq!(
            t.sink.severities(),
            vec![Severity::Warning, Severity::Critical, Severity::Info]
        );
        assert_eq!(t.process().stage(), Stage::Normal);
    }

    // ── failures and reentrancy ───────────────────────────────────────────────

    #[test]
    fn snapshot_failure_keeps_state_and_alerts_critical() {
        let mut t = tracker(ScriptedSource::default().then(&[(42, "nginx")]).then_fail());
        t.poll();
        assert_eq!(t.poll(), PollOutcome::SnapshotFailed);
        assert_eq!(t.process().stage(), Stage::Normal);
        assert_eq!(t.process().pid(), Some(42));
        assert!(!t.process().is_polling());
        assert_eq!(t.sink.severities(), vec![Severity::Critical]);
    }

    #[test]
    fn snapshot_failure_before_first_sighting_is_not_a_stop() {
        let mut t = tracker(ScriptedSource::default().then_fail());
        assert_eq!(t.poll(), PollOutcome::SnapshotFailed);
        assert_eq!(t.process().stage(), Stage::Unknown);
    }

    #[test]
    fn overlapping_cycle_is_skipped_with_info_alert() {
        let mut t = tracker(ScriptedSource::default().then(&[(42, "nginx")]));
        t.poll();
        t.process.polling = true;

        assert_eq!(t.poll(), PollOutcome::Skipped);
        assert_eq!(t.source.calls, 1);
        assert_eq!(t.process().stage(), Stage::Normal);
        assert_eq!(t.process().pid(), Some(42));
        assert!(t.process().is_polling());
        assert_eq!(t.sink.severities(), vec![Severity::Info]);
    }

    #[test]
    fn guard_is_released_after_every_cycle() {
        let mut t = tracker(ScriptedSource::default().then(&[(42, "nginx")]).then(&[]));
        t.poll();
        assert!(!t.process().is_polling());
        t.poll();
        assert!(!t.process().is_polling());
    }

    // ── run ───────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn run_polls_at_start_and_every_period_until_shutdown() {
        let mut t = tracker(ScriptedSource::default().then(&[(42, "nginx")]));
        run(
            &mut t,
            Duration::from_secs(10),
            tokio::time::sleep(Duration::from_secs(25)),
        )
        .await;
        // t = 0s, 10s, 20s
        assert_eq!(t.source.calls, 3);
        assert_eq!(t.process().pid(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_immediately_when_already_shut_down() {
        let mut t = tracker(ScriptedSource::default());
        run(&mut t, Duration::from_secs(10), std::future::ready(())).await;
        assert_eq!(t.source.calls, 0);
    }
}
