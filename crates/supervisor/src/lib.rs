// Text Analysis Desktop - Supervisor Core
// Crate root: module layout and public re-exports

//! Backend supervision for the Text Analysis desktop shell.
//!
//! The shell launches the Streamlit backend as a child process, waits until
//! `http://localhost:<port>/` answers, shows it in a single native window and
//! makes sure the backend does not outlive the shell. Everything here is
//! independent of the windowing toolkit: the desktop binary plugs in through
//! [`ShellUi`] (window and dialogs) and [`ShellHost`] (the IPC surface).

pub mod config;
pub mod error;
pub mod ipc;
pub mod launch;
pub mod logging;
pub mod navigation;
pub mod probe;
pub mod process;
pub mod supervisor;
pub mod terminate;

pub use config::ShellSettings;
pub use error::{ErrorClass, IpcError, SupervisorError};
pub use ipc::{IpcBoundary, IpcRequest, IpcResponse, Platform, ShellHost};
pub use launch::{BackendLayout, LaunchPlan};
pub use navigation::{Navigation, NavigationPolicy};
pub use probe::{HttpProbe, ProbeOutcome, ReadinessProbe};
pub use process::BackendExit;
pub use supervisor::{ShellUi, Supervisor, SupervisorState};
pub use terminate::{platform_terminator, ProcessTreeTerminator};
