// Text Analysis Desktop - Process Tree Termination
// SIGTERM/SIGKILL to the backend's process group on Unix, taskkill on Windows

use std::io;
use std::sync::Arc;

/// Terminate a process and everything it spawned. Implementations do not
/// wait for the exit; the supervisor owns the bounded wait and escalation.
pub trait ProcessTreeTerminator: Send + Sync {
    /// Ask the tree to exit; does not wait.
    fn terminate_tree(&self, pid: u32) -> io::Result<()>;

    /// Forceful escalation once the grace period has passed.
    fn kill_tree(&self, pid: u32) -> io::Result<()>;

    fn name(&self) -> &'static str;
}

/// `SIGTERM` to the child's process group (the child is its group leader).
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

#[cfg(unix)]
impl ProcessTreeTerminator for SignalTerminator {
    fn terminate_tree(&self, pid: u32) -> io::Result<()> {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }

    fn kill_tree(&self, pid: u32) -> io::Result<()> {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }

    fn name(&self) -> &'static str {
        "sigterm-process-group"
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Ok(()),
        // Not a group leader after all; fall back to the process itself
        Err(Errno::EPERM) => match kill(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        },
        Err(e) => Err(io::Error::from(e)),
    }
}

/// `taskkill /PID <pid> /T /F`.
#[cfg(target_os = "windows")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeKillTerminator;

#[cfg(target_os = "windows")]
impl ProcessTreeTerminator for TreeKillTerminator {
    fn terminate_tree(&self, pid: u32) -> io::Result<()> {
        use std::os::windows::process::CommandExt;
        use std::process::{Command, Stdio};

        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .creation_flags(CREATE_NO_WINDOW)
            .output()?;

        // 128: process not found, already gone
        if output.status.success() || output.status.code() == Some(128) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "taskkill failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }

    // taskkill /F is already forceful
    fn kill_tree(&self, pid: u32) -> io::Result<()> {
        self.terminate_tree(pid)
    }

    fn name(&self) -> &'static str {
        "taskkill-tree"
    }
}

/// The termination strategy for the current build target.
pub fn platform_terminator() -> Arc<dyn ProcessTreeTerminator> {
    #[cfg(unix)]
    {
        Arc::new(SignalTerminator)
    }
    #[cfg(target_os = "windows")]
    {
        Arc::new(TreeKillTerminator)
    }
}
