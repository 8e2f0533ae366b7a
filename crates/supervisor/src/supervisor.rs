// Text Analysis Desktop - Shell Supervisor
// Owns the backend process and the main window for the life of the shell

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::config::{ProbePolicy, ShellSettings, StopPolicy};
use crate::error::{Result, SupervisorError};
use crate::launch::LaunchPlan;
use crate::probe::{wait_for_ready, HttpProbe, ProbeFailure, ReadinessProbe};
use crate::process::{BackendExit, SupervisedProcess};
use crate::terminate::{platform_terminator, ProcessTreeTerminator};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Native side of the shell: the main window and user-facing dialogs
pub trait ShellUi: Send + Sync {
    /// Create the main window pointed at `url`. Called at most once per window.
    fn open_main_window(&self, url: &str) -> anyhow::Result<()>;

    /// Point the existing main window at `url` again (after a restart)
    fn reload_main_window(&self, url: &str) -> anyhow::Result<()>;

    /// Blocking error dialog; the launch is aborted
    fn report_startup_failure(&self, error: &SupervisorError);

    /// A restart failed while the main window is open; the shell stays up
    fn report_restart_failure(&self, error: &SupervisorError);

    /// The backend exited unexpectedly while the window is open
    fn report_crash(&self, exit: BackendExit);
}

/// Lifecycle of the backend service process
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SupervisorState {
    Idle,
    Starting,
    WaitingReady,
    Ready,
    Running,
    Stopping,
    Crashed { exit: BackendExit },
    Failed { reason: String },
}

impl SupervisorState {
    pub fn label(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::WaitingReady => "waiting-ready",
            SupervisorState::Ready => "ready",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Crashed { .. } => "crashed",
            SupervisorState::Failed { .. } => "failed",
        }
    }

    pub fn can_transition_to(&self, next: &SupervisorState) -> bool {
        use SupervisorState::*;

        matches!(
            (self, next),
            (Idle | Failed { .. } | Crashed { .. }, Starting)
                | (Starting, WaitingReady | Failed { .. } | Stopping)
                | (WaitingReady, Ready | Failed { .. } | Stopping)
                | (Ready, Running | Failed { .. } | Stopping)
                | (Running, Stopping | Crashed { .. } | Idle)
                | (Crashed { .. }, Stopping | Idle)
                | (Failed { .. }, Stopping | Idle)
                | (Stopping, Idle)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single owner of the backend process and the main window
pub struct Supervisor {
    plan: LaunchPlan,
    probe_policy: ProbePolicy,
    stop_policy: StopPolicy,
    probe: Arc<dyn ReadinessProbe>,
    terminator: Arc<dyn ProcessTreeTerminator>,
    ui: Arc<dyn ShellUi>,
    child: Mutex<Option<SupervisedProcess>>,
    state: watch::Sender<SupervisorState>,
    shutdown: watch::Sender<bool>,
    window_open: AtomicBool,
}

impl Supervisor {
    pub fn new(plan: LaunchPlan, settings: &ShellSettings, ui: Arc<dyn ShellUi>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        let (shutdown, _) = watch::channel(false);

        Self {
            plan,
            probe_policy: settings.probe_policy(),
            stop_policy: settings.stop_policy(),
            probe: Arc::new(HttpProbe::new()),
            terminator: platform_terminator(),
            ui,
            child: Mutex::new(None),
            state,
            shutdown,
            window_open: AtomicBool::new(false),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTreeTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn backend_url(&self) -> String {
        self.plan.url()
    }

    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    pub fn has_main_window(&self) -> bool {
        self.window_open.load(Ordering::SeqCst)
    }

    /// The native window is gone; a later start opens a fresh one
    pub fn main_window_closed(&self) {
        if self.window_open.swap(false, Ordering::SeqCst) {
            tracing::info!("main window closed");
        }
    }

    /// Re-create the main window for a running backend (macOS dock reopen).
    /// Returns whether a window was opened.
    pub fn reopen_main_window(&self) -> Result<bool> {
        if self.state() != SupervisorState::Running || self.is_shutting_down() {
            return Ok(false);
        }
        if self
            .window_open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        let url = self.plan.url();
        tracing::info!(url = %url, "reopening main window");
        self.ui.open_main_window(&url).map_err(|e| {
            self.window_open.store(false, Ordering::SeqCst);
            SupervisorError::Window(e.to_string())
        })?;
        Ok(true)
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Backend is up and its process has not exited
    pub async fn is_running(&self) -> bool {
        if self.state() != SupervisorState::Running {
            return false;
        }
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(process) => process.try_exit().is_none(),
            None => false,
        }
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().map(SupervisedProcess::pid)
    }

    /// Spawn the backend, wait for it to answer, then show it in the main window
    pub async fn start(&self) -> Result<()> {
        if self.is_shutting_down() {
            return Err(SupervisorError::Cancelled);
        }
        self.advance(SupervisorState::Starting)?;

        let url = self.plan.url();
        {
            // Held across spawn so a concurrent stop() always sees the child
            let mut guard = self.child.lock().await;
            if self.is_shutting_down() {
                drop(guard);
                self.wind_down();
                return Err(SupervisorError::Cancelled);
            }
            match SupervisedProcess::spawn(&self.plan) {
                Ok(process) => *guard = Some(process),
                Err(e) => {
                    drop(guard);
                    return Err(self.fail_startup(e).await);
                }
            }
        }

        if self.is_shutting_down() {
            self.terminate_backend().await?;
            return Err(SupervisorError::Cancelled);
        }
        self.advance(SupervisorState::WaitingReady)?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let waited = tokio::select! {
            ready = wait_for_ready(self.probe.as_ref(), &url, self.probe_policy) => Ok(ready),
            exit = self.wait_for_exit() => Err(exit),
            _ = async {
                let _ = shutdown_rx.wait_for(|quit| *quit).await;
            } => return Err(SupervisorError::Cancelled),
        };

        match waited {
            Ok(Ok(_report)) => {}
            Ok(Err(ProbeFailure::TimedOut { attempts, .. })) => {
                let err = SupervisorError::ReadinessTimeout {
                    url,
                    timeout: self.probe_policy.timeout,
                    attempts,
                };
                return Err(self.fail_startup(err).await);
            }
            Ok(Err(ProbeFailure::Probe(reason))) => {
                return Err(self.fail_startup(SupervisorError::Probe(reason)).await);
            }
            Err(exit) => {
                return Err(self.fail_startup(SupervisorError::ExitedDuringStartup(exit)).await);
            }
        }

        self.advance(SupervisorState::Ready)?;

        let shown = if self
            .window_open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::info!(url = %url, "opening main window");
            self.ui.open_main_window(&url).inspect_err(|_| {
                self.window_open.store(false, Ordering::SeqCst);
            })
        } else {
            tracing::info!(url = %url, "reloading main window");
            self.ui.reload_main_window(&url)
        };
        if let Err(e) = shown {
            return Err(self.fail_startup(SupervisorError::Window(e.to_string())).await);
        }

        self.advance(SupervisorState::Running)
    }

    /// One exit check of the running backend. Returns the exit if it was handled.
    pub async fn check_exit(&self) -> Option<BackendExit> {
        let mut guard = self.child.lock().await;
        if self.state() != SupervisorState::Running {
            return None;
        }
        let exit = guard.as_mut()?.try_exit()?;
        let process = guard.take();
        let pid = process.as_ref().map(SupervisedProcess::pid);

        if exit.is_clean() {
            tracing::info!(?pid, %exit, "backend exited normally");
            self.log_transition_error(self.transition(SupervisorState::Idle));
            return Some(exit);
        }

        tracing::error!(?pid, %exit, "backend exited unexpectedly");
        self.log_transition_error(self.transition(SupervisorState::Crashed { exit }));
        drop(guard);

        self.ui.report_crash(exit);
        Some(exit)
    }

    /// Poll for unexpected exits until shutdown
    pub async fn monitor(&self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::debug!(interval = ?self.stop_policy.exit_poll_interval, "backend monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.stop_policy.exit_poll_interval) => {}
                _ = async {
                    let _ = shutdown_rx.wait_for(|quit| *quit).await;
                } => break,
            }
            self.check_exit().await;
        }

        tracing::debug!("backend monitor stopped");
    }

    /// User-initiated recovery after a crash or failed start
    pub async fn restart(&self) -> Result<()> {
        tracing::info!(state = %self.state(), "backend restart requested");

        if self.child.lock().await.is_some() {
            self.advance(SupervisorState::Stopping)?;
            self.terminate_backend().await?;
            self.advance(SupervisorState::Idle)?;
        }
        self.start().await
    }

    /// Application quit: terminate the backend and stay down
    pub async fn stop(&self) -> Result<()> {
        self.shutdown.send_replace(true);

        if self.child.lock().await.is_none() {
            self.wind_down();
            return Ok(());
        }

        self.log_transition_error(self.transition(SupervisorState::Stopping));
        let result = self.terminate_backend().await;
        self.log_transition_error(self.transition(SupervisorState::Idle));
        result.map(|_| ())
    }

    /// Synchronous best-effort teardown for fault paths
    pub fn stop_now(&self) {
        self.shutdown.send_replace(true);

        let Ok(mut guard) = self.child.try_lock() else {
            tracing::warn!("backend handle busy, skipping emergency teardown");
            return;
        };
        if let Some(mut process) = guard.take() {
            let pid = process.pid();
            tracing::warn!(pid, "emergency backend teardown");
            if let Err(e) = self.terminator.terminate_tree(pid) {
                tracing::error!(pid, error = %e, "terminate failed, killing");
                let _ = process.force_kill();
            }
        }
    }

    async fn wait_for_exit(&self) -> BackendExit {
        loop {
            if let Some(exit) = self.poll_child().await {
                return exit;
            }
            tokio::time::sleep(self.stop_policy.exit_poll_interval).await;
        }
    }

    async fn poll_child(&self) -> Option<BackendExit> {
        self.child.lock().await.as_mut()?.try_exit()
    }

    /// Signal the tree once, wait out the grace period, then force-kill
    async fn terminate_backend(&self) -> Result<Option<BackendExit>> {
        let Some(mut process) = self.child.lock().await.take() else {
            return Ok(None);
        };
        let pid = process.pid();

        if let Some(exit) = process.try_exit() {
            tracing::info!(pid, %exit, "backend already exited");
            return Ok(Some(exit));
        }

        tracing::info!(pid, strategy = self.terminator.name(), "terminating backend");
        let signalled = self.terminator.terminate_tree(pid);
        if let Err(e) = &signalled {
            tracing::warn!(pid, error = %e, "termination signal failed");
        }

        let started = Instant::now();
        loop {
            if let Some(exit) = process.try_exit() {
                tracing::info!(pid, %exit, "backend stopped");
                return Ok(Some(exit));
            }
            if started.elapsed() >= self.stop_policy.grace {
                break;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        tracing::warn!(pid, grace = ?self.stop_policy.grace, "backend still alive, killing");
        if let Err(e) = self.terminator.kill_tree(pid) {
            tracing::warn!(pid, error = %e, "tree kill failed");
        }
        process
            .force_kill()
            .map_err(|source| SupervisorError::Terminate { pid, source })?;

        match signalled {
            Ok(()) => Ok(process.last_exit()),
            Err(source) if process.last_exit().is_none() => {
                Err(SupervisorError::Terminate { pid, source })
            }
            Err(_) => Ok(process.last_exit()),
        }
    }

    async fn fail_startup(&self, err: SupervisorError) -> SupervisorError {
        tracing::error!(error = %err, "backend startup failed");

        if let Err(e) = self.terminate_backend().await {
            tracing::warn!(error = %e, "failed to clean up backend after startup failure");
        }
        self.log_transition_error(self.transition(SupervisorState::Failed {
            reason: err.to_string(),
        }));
        if self.has_main_window() {
            self.ui.report_restart_failure(&err);
        } else {
            self.ui.report_startup_failure(&err);
        }
        err
    }

    /// Settle in Idle when there is no backend left to stop
    fn wind_down(&self) {
        if !matches!(self.state(), SupervisorState::Idle | SupervisorState::Stopping) {
            self.log_transition_error(self.transition(SupervisorState::Stopping));
            self.log_transition_error(self.transition(SupervisorState::Idle));
        }
    }

    /// Transition that turns into `Cancelled` once shutdown has begun
    fn advance(&self, next: SupervisorState) -> Result<()> {
        match self.transition(next) {
            Err(_) if self.is_shutting_down() => Err(SupervisorError::Cancelled),
            other => other,
        }
    }

    fn transition(&self, next: SupervisorState) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if !current.can_transition_to(&next) {
                outcome = Err(SupervisorError::InvalidTransition {
                    from: current.label(),
                    to: next.label(),
                });
                return false;
            }
            tracing::info!(from = current.label(), to = next.label(), "backend lifecycle transition");
            *current = next.clone();
            true
        });
        outcome
    }

    fn log_transition_error(&self, result: Result<()>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "lifecycle transition skipped");
        }
    }
}
