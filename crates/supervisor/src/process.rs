// Text Analysis Desktop - Supervised Backend Process
// Spawning and exit polling of the backend service child

use std::fmt;
use std::process::{Child, ExitStatus, Stdio};
use std::time::Instant;

use serde::Serialize;

use crate::error::{Result, SupervisorError};
use crate::launch::LaunchPlan;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// How the backend process ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BackendExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl BackendExit {
    /// Only exit code 0 counts as a normal shutdown
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for BackendExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for BackendExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// A running backend service process, exclusively owned by the supervisor
pub struct SupervisedProcess {
    child: Child,
    pid: u32,
    started_at: Instant,
    last_exit: Option<BackendExit>,
}

impl SupervisedProcess {
    /// Spawn the backend described by `plan`
    pub fn spawn(plan: &LaunchPlan) -> Result<Self> {
        let program = plan.program.display().to_string();

        if plan.program_is_path() && !plan.program.exists() {
            return Err(SupervisorError::Spawn {
                program,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "executable not found",
                ),
            });
        }

        let mut cmd = plan.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Own process group so the whole tree can be signalled at once
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let child = cmd
            .spawn()
            .map_err(|source| SupervisorError::Spawn { program, source })?;
        let pid = child.id();

        tracing::info!(pid, command = %plan.debug_command(), cwd = %plan.cwd.display(), "backend spawned");

        Ok(Self {
            child,
            pid,
            started_at: Instant::now(),
            last_exit: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn last_exit(&self) -> Option<BackendExit> {
        self.last_exit
    }

    /// Non-blocking exit check
    pub fn try_exit(&mut self) -> Option<BackendExit> {
        if self.last_exit.is_some() {
            return self.last_exit;
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                let exit = BackendExit::from(status);
                self.last_exit = Some(exit);
                Some(exit)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "failed to poll backend status");
                None
            }
        }
    }

    /// Forceful kill of the direct child; used after the grace period
    pub fn force_kill(&mut self) -> std::io::Result<()> {
        match self.child.kill() {
            Ok(()) => {
                if let Ok(status) = self.child.wait() {
                    self.last_exit = Some(BackendExit::from(status));
                }
                Ok(())
            }
            // Already reaped
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("pid", &self.pid)
            .field("uptime", &self.uptime())
            .field("last_exit", &self.last_exit)
            .finish()
    }
}
