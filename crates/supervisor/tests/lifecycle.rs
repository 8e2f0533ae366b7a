//! Supervisor lifecycle against real child processes.
#![cfg(unix)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use textanalysis_supervisor::error::{ErrorClass, SupervisorError};
use textanalysis_supervisor::probe::{ProbeOutcome, ReadinessProbe};
use textanalysis_supervisor::process::BackendExit;
use textanalysis_supervisor::supervisor::{ShellUi, Supervisor, SupervisorState};
use textanalysis_supervisor::terminate::{ProcessTreeTerminator, SignalTerminator};
use textanalysis_supervisor::{LaunchPlan, ShellSettings};

// ── Helpers ──────────────────────────────────────────────────────────

const PORT: u16 = 8599;

/// Not ready until the `ready_on`-th attempt
struct ScriptedProbe {
    ready_on: u32,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn probe(&self, _url: &str) -> ProbeOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.ready_on {
            ProbeOutcome::Ready
        } else {
            ProbeOutcome::NotReady("connection refused".to_string())
        }
    }
}

/// Ready on the first attempt only; every later start stays unreachable
#[derive(Default)]
struct ReadyOnceProbe {
    attempts: AtomicU32,
}

#[async_trait]
impl ReadinessProbe for ReadyOnceProbe {
    async fn probe(&self, _url: &str) -> ProbeOutcome {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            ProbeOutcome::Ready
        } else {
            ProbeOutcome::NotReady("connection refused".to_string())
        }
    }
}

#[derive(Default)]
struct RecordingUi {
    attempts: Arc<AtomicU32>,
    /// (url, probe attempts seen when the window was created)
    opened: Mutex<Vec<(String, u32)>>,
    reloaded: Mutex<Vec<String>>,
    failures: Mutex<Vec<ErrorClass>>,
    restart_failures: Mutex<Vec<ErrorClass>>,
    crashes: Mutex<Vec<BackendExit>>,
}

impl ShellUi for RecordingUi {
    fn open_main_window(&self, url: &str) -> anyhow::Result<()> {
        let seen = self.attempts.load(Ordering::SeqCst);
        self.opened.lock().unwrap().push((url.to_string(), seen));
        Ok(())
    }

    fn reload_main_window(&self, url: &str) -> anyhow::Result<()> {
        self.reloaded.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn report_startup_failure(&self, error: &SupervisorError) {
        self.failures.lock().unwrap().push(error.class());
    }

    fn report_restart_failure(&self, error: &SupervisorError) {
        self.restart_failures.lock().unwrap().push(error.class());
    }

    fn report_crash(&self, exit: BackendExit) {
        self.crashes.lock().unwrap().push(exit);
    }
}

#[derive(Default)]
struct CountingTerminator {
    pids: Mutex<Vec<u32>>,
}

impl ProcessTreeTerminator for CountingTerminator {
    fn terminate_tree(&self, pid: u32) -> std::io::Result<()> {
        self.pids.lock().unwrap().push(pid);
        SignalTerminator.terminate_tree(pid)
    }

    fn kill_tree(&self, pid: u32) -> std::io::Result<()> {
        SignalTerminator.kill_tree(pid)
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

struct Harness {
    sup: Arc<Supervisor>,
    ui: Arc<RecordingUi>,
    attempts: Arc<AtomicU32>,
    terminator: Arc<CountingTerminator>,
}

fn settings() -> ShellSettings {
    ShellSettings {
        backend_port: PORT,
        probe_interval_ms: 10,
        startup_timeout_secs: 30,
        stop_grace_ms: 2_000,
        exit_poll_interval_ms: 20,
        ..ShellSettings::default()
    }
}

fn harness(plan: LaunchPlan, ready_on: u32, settings: ShellSettings) -> Harness {
    let attempts = Arc::new(AtomicU32::new(0));
    let ui = Arc::new(RecordingUi {
        attempts: attempts.clone(),
        ..RecordingUi::default()
    });
    let terminator = Arc::new(CountingTerminator::default());
    let sup = Supervisor::new(plan, &settings, ui.clone())
        .with_probe(Arc::new(ScriptedProbe {
            ready_on,
            attempts: attempts.clone(),
        }))
        .with_terminator(terminator.clone());

    Harness {
        sup: Arc::new(sup),
        ui,
        attempts,
        terminator,
    }
}

fn sh(script: &str) -> LaunchPlan {
    LaunchPlan::new("sh", vec!["-c".to_string(), script.to_string()], ".", PORT)
}

fn long_running() -> LaunchPlan {
    LaunchPlan::new("sleep", vec!["30".to_string()], ".", PORT)
}

fn process_gone(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_err()
}

async fn wait_for_state(sup: &Supervisor, pred: impl Fn(&SupervisorState) -> bool) -> SupervisorState {
    let mut rx = sup.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| pred(s)))
        .await
        .expect("state not reached in time")
        .expect("supervisor dropped");
    state.clone()
}

// ══════════════════════════════════════════════════════════════════════
// Startup
// ══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn window_opens_after_fourth_probe_at_backend_root() {
    let h = harness(long_running(), 4, settings());

    h.sup.start().await.unwrap();

    assert_eq!(h.sup.state(), SupervisorState::Running);
    assert_eq!(
        *h.ui.opened.lock().unwrap(),
        vec![(format!("http://localhost:{PORT}/"), 4)]
    );
    assert!(h.sup.has_main_window());
    assert!(h.sup.is_running().await);
    assert!(h.ui.failures.lock().unwrap().is_empty());

    h.sup.stop().await.unwrap();
}

#[tokio::test]
async fn window_is_never_created_before_readiness() {
    for ready_on in [1, 2, 5, 9] {
        let h = harness(long_running(), ready_on, settings());
        h.sup.start().await.unwrap();

        let opened = h.ui.opened.lock().unwrap().clone();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].1, ready_on, "window created before probe {ready_on}");

        h.sup.stop().await.unwrap();
    }
}

#[tokio::test]
async fn missing_executable_fails_without_probing() {
    let plan = LaunchPlan::new("/opt/textanalysis/missing/python3", vec![], ".", PORT);
    let h = harness(plan, 1, settings());

    let err = h.sup.start().await.unwrap_err();

    assert!(matches!(err, SupervisorError::Spawn { .. }));
    assert_eq!(*h.ui.failures.lock().unwrap(), vec![ErrorClass::StartupFailure]);
    assert_eq!(h.attempts.load(Ordering::SeqCst), 0);
    assert!(h.ui.opened.lock().unwrap().is_empty());
    assert!(matches!(h.sup.state(), SupervisorState::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_is_fatal_and_cleans_up() {
    let settings = ShellSettings {
        probe_interval_ms: 500,
        ..settings()
    };
    let h = harness(long_running(), u32::MAX, settings);

    let err = h.sup.start().await.unwrap_err();

    match &err {
        SupervisorError::ReadinessTimeout { timeout, attempts, .. } => {
            assert_eq!(*timeout, Duration::from_secs(30));
            assert!((60..=62).contains(attempts), "{attempts} attempts");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(*h.ui.failures.lock().unwrap(), vec![ErrorClass::StartupFailure]);
    assert!(h.ui.opened.lock().unwrap().is_empty());
    assert_eq!(h.sup.pid().await, None);

    let pids = h.terminator.pids.lock().unwrap().clone();
    assert_eq!(pids.len(), 1);
    assert!(process_gone(pids[0]));
}

#[tokio::test]
async fn backend_exiting_during_startup_is_a_startup_failure() {
    let h = harness(sh("exit 2"), u32::MAX, settings());

    let err = h.sup.start().await.unwrap_err();

    match err {
        SupervisorError::ExitedDuringStartup(exit) => assert_eq!(exit.code, Some(2)),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.ui.failures.lock().unwrap().len(), 1);
    assert!(h.ui.opened.lock().unwrap().is_empty());
    assert!(h.terminator.pids.lock().unwrap().is_empty());
}

#[tokio::test]
async fn quitting_during_startup_cancels_the_wait() {
    let h = harness(long_running(), u32::MAX, settings());

    let sup = h.sup.clone();
    let starting = tokio::spawn(async move { sup.start().await });

    wait_for_state(&h.sup, |s| *s == SupervisorState::WaitingReady).await;
    h.sup.stop().await.unwrap();

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(SupervisorError::Cancelled)));
    assert_eq!(h.sup.state(), SupervisorState::Idle);
    assert!(h.ui.failures.lock().unwrap().is_empty());
    assert!(h.ui.opened.lock().unwrap().is_empty());
    assert_eq!(h.terminator.pids.lock().unwrap().len(), 1);
}

// ══════════════════════════════════════════════════════════════════════
// Running
// ══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn exit_137_while_running_reports_one_crash_and_keeps_window() {
    let h = harness(sh("sleep 0.3; exit 137"), 1, settings());
    h.sup.start().await.unwrap();

    let monitor = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.monitor().await })
    };

    let state = wait_for_state(&h.sup, |s| matches!(s, SupervisorState::Crashed { .. })).await;
    assert_eq!(
        state,
        SupervisorState::Crashed {
            exit: BackendExit { code: Some(137), signal: None }
        }
    );

    // Several more polling ticks must not repeat the notification
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.ui.crashes.lock().unwrap().len(), 1);
    assert!(h.sup.check_exit().await.is_none());
    assert!(h.sup.has_main_window());
    assert!(!h.sup.is_running().await);

    h.sup.stop().await.unwrap();
    monitor.await.unwrap();
}

#[tokio::test]
async fn externally_killed_backend_is_a_crash() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let h = harness(long_running(), 1, settings());
    h.sup.start().await.unwrap();
    let pid = h.sup.pid().await.unwrap();

    let monitor = {
        let sup = h.sup.clone();
        tokio::spawn(async move { sup.monitor().await })
    };

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();

    let state = wait_for_state(&h.sup, |s| matches!(s, SupervisorState::Crashed { .. })).await;
    match state {
        SupervisorState::Crashed { exit } => {
            assert_eq!(exit.code, None);
            assert_eq!(exit.signal, Some(9));
        }
        other => panic!("unexpected state: {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.ui.crashes.lock().unwrap().len(), 1);

    h.sup.stop().await.unwrap();
    monitor.await.unwrap();
    // Nothing left to signal after the crash
    assert!(h.terminator.pids.lock().unwrap().is_empty());
}

#[tokio::test]
async fn clean_exit_is_not_a_crash() {
    let h = harness(sh("sleep 0.3; exit 0"), 1, settings());
    h.sup.start().await.unwrap();

    let mut exit = None;
    for _ in 0..200 {
        exit = h.sup.check_exit().await;
        if exit.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(exit, Some(BackendExit { code: Some(0), signal: None }));
    assert_eq!(h.sup.state(), SupervisorState::Idle);
    assert!(h.ui.crashes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn restart_after_crash_reuses_the_window() {
    let h = harness(sh("sleep 0.3; exit 137"), 1, settings());
    h.sup.start().await.unwrap();

    let mut crashed = None;
    for _ in 0..200 {
        crashed = h.sup.check_exit().await;
        if crashed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(crashed.is_some());
    assert!(matches!(h.sup.state(), SupervisorState::Crashed { .. }));

    h.sup.restart().await.unwrap();

    assert_eq!(h.sup.state(), SupervisorState::Running);
    assert_eq!(h.ui.opened.lock().unwrap().len(), 1);
    assert_eq!(
        *h.ui.reloaded.lock().unwrap(),
        vec![format!("http://localhost:{PORT}/")]
    );

    h.sup.stop().await.unwrap();
}

#[tokio::test]
async fn failed_restart_keeps_the_open_window() {
    let ui = Arc::new(RecordingUi::default());
    let sup = Supervisor::new(sh("sleep 0.3; exit 137"), &settings(), ui.clone())
        .with_probe(Arc::new(ReadyOnceProbe::default()));
    sup.start().await.unwrap();

    let mut crashed = None;
    for _ in 0..200 {
        crashed = sup.check_exit().await;
        if crashed.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(crashed.is_some());

    let err = sup.restart().await.unwrap_err();

    assert!(matches!(err, SupervisorError::ExitedDuringStartup(_)), "{err:?}");
    assert!(sup.has_main_window());
    assert!(matches!(sup.state(), SupervisorState::Failed { .. }));
    assert!(ui.failures.lock().unwrap().is_empty(), "fatal dialog shown with window open");
    assert_eq!(
        *ui.restart_failures.lock().unwrap(),
        vec![ErrorClass::StartupFailure]
    );
    assert_eq!(ui.opened.lock().unwrap().len(), 1);

    sup.stop().await.unwrap();
    assert_eq!(sup.state(), SupervisorState::Idle);
}

// ══════════════════════════════════════════════════════════════════════
// Shutdown
// ══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn quit_signals_the_backend_exactly_once() {
    let h = harness(long_running(), 1, settings());
    h.sup.start().await.unwrap();
    let pid = h.sup.pid().await.unwrap();

    let (a, b) = tokio::join!(h.sup.stop(), h.sup.stop());
    a.unwrap();
    b.unwrap();
    h.sup.stop().await.unwrap();
    h.sup.stop_now();

    assert_eq!(*h.terminator.pids.lock().unwrap(), vec![pid]);
    assert_eq!(h.sup.state(), SupervisorState::Idle);
    assert!(process_gone(pid));
    assert!(h.sup.is_shutting_down());
    assert!(matches!(h.sup.start().await, Err(SupervisorError::Cancelled)));
}

#[tokio::test]
async fn stubborn_backend_is_force_killed_after_grace() {
    let settings = ShellSettings {
        stop_grace_ms: 200,
        ..settings()
    };
    let h = harness(sh("trap '' TERM; while :; do sleep 0.05; done"), 1, settings);
    h.sup.start().await.unwrap();
    let pid = h.sup.pid().await.unwrap();

    h.sup.stop().await.unwrap();

    assert_eq!(h.terminator.pids.lock().unwrap().len(), 1);
    assert!(process_gone(pid));
    assert_eq!(h.sup.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn emergency_teardown_signals_synchronously() {
    let h = harness(long_running(), 1, settings());
    h.sup.start().await.unwrap();
    let pid = h.sup.pid().await.unwrap();

    h.sup.stop_now();

    assert_eq!(*h.terminator.pids.lock().unwrap(), vec![pid]);
    assert_eq!(h.sup.pid().await, None);
    assert!(h.sup.is_shutting_down());
}
