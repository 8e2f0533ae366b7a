// Text Analysis Desktop - Backend Launch Plan
// Resolves the Python runtime and builds the Streamlit invocation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ShellSettings;

/// Web framework module started with `python -m`
pub const BACKEND_MODULE: &str = "streamlit";

/// Everything needed to spawn the backend service process
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub port: u16,
}

impl LaunchPlan {
    /// Plan for an arbitrary program; mostly useful for tests and tooling
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, cwd: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
            env: BTreeMap::new(),
            port,
        }
    }

    /// `<python> -m streamlit run <entry> --server.port <port> ...`
    pub fn streamlit(python: PathBuf, app_root: PathBuf, entry_script: &str, port: u16) -> Self {
        let port_arg = port.to_string();
        let args = [
            "-m",
            BACKEND_MODULE,
            "run",
            entry_script,
            "--server.port",
            port_arg.as_str(),
            "--server.headless",
            "true",
            "--browser.gatherUsageStats",
            "false",
            "--server.address",
            "localhost",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut plan = Self::new(python, args, app_root, port);
        plan.env.insert("PYTHONUNBUFFERED".into(), "1".into());
        plan
    }

    /// Add environment overrides on top of the inherited environment
    pub fn with_env(mut self, vars: &BTreeMap<String, String>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Root address of the backend; what the readiness probe hits and the window loads
    pub fn url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    pub fn debug_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Whether the program names a filesystem location rather than a `PATH` lookup
    pub fn program_is_path(&self) -> bool {
        self.program.is_absolute() || self.program.components().count() > 1
    }

    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd).envs(&self.env);
        cmd
    }
}

/// Where the Python runtime and backend sources come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeSource {
    Configured,
    Bundled,
    VirtualEnv,
    SystemPath,
}

/// Resolved runtime layout
#[derive(Clone, Debug, PartialEq)]
pub struct BackendLayout {
    pub python: PathBuf,
    pub app_root: PathBuf,
    pub source: RuntimeSource,
}

#[cfg(target_os = "windows")]
const BUNDLED_PYTHON: &str = "python.exe";
#[cfg(not(target_os = "windows"))]
const BUNDLED_PYTHON: &str = "bin/python3";

#[cfg(target_os = "windows")]
const VENV_PYTHON: &str = ".venv/Scripts/python.exe";
#[cfg(not(target_os = "windows"))]
const VENV_PYTHON: &str = ".venv/bin/python";

#[cfg(target_os = "windows")]
const SYSTEM_PYTHON: &str = "python";
#[cfg(not(target_os = "windows"))]
const SYSTEM_PYTHON: &str = "python3";

impl BackendLayout {
    /// Pick the runtime: configured interpreter, then bundled resources,
    /// then the project's virtualenv, then whatever is on `PATH`.
    pub fn resolve(resource_dir: &Path, dev_root: &Path, settings: &ShellSettings) -> Self {
        let bundled_python = resource_dir.join("python").join(BUNDLED_PYTHON);
        let bundled_app = resource_dir.join("app");
        let bundled = bundled_python.exists() && bundled_app.join(&settings.entry_script).exists();

        let app_root = if bundled {
            bundled_app
        } else {
            dev_root.to_path_buf()
        };

        if let Some(python) = &settings.python_path {
            return Self {
                python: python.clone(),
                app_root,
                source: RuntimeSource::Configured,
            };
        }

        if bundled {
            return Self {
                python: bundled_python,
                app_root,
                source: RuntimeSource::Bundled,
            };
        }

        let venv_python = dev_root.join(VENV_PYTHON);
        if venv_python.exists() {
            return Self {
                python: venv_python,
                app_root,
                source: RuntimeSource::VirtualEnv,
            };
        }

        Self {
            python: PathBuf::from(SYSTEM_PYTHON),
            app_root,
            source: RuntimeSource::SystemPath,
        }
    }

    pub fn launch_plan(&self, settings: &ShellSettings) -> LaunchPlan {
        LaunchPlan::streamlit(
            self.python.clone(),
            self.app_root.clone(),
            &settings.entry_script,
            settings.backend_port,
        )
        .with_env(&settings.backend_env)
    }
}
