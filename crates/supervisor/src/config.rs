// Text Analysis Desktop - Shell Settings
// Persisted shell configuration plus environment overrides

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable names understood by the shell
pub mod env_keys {
    pub const BACKEND_PORT: &str = "TEXTANALYSIS_BACKEND_PORT";
    pub const PYTHON: &str = "TEXTANALYSIS_PYTHON";
    pub const PROBE_INTERVAL_MS: &str = "TEXTANALYSIS_PROBE_INTERVAL_MS";
    pub const STARTUP_TIMEOUT_SECS: &str = "TEXTANALYSIS_STARTUP_TIMEOUT_SECS";
}

pub const DEFAULT_BACKEND_PORT: u16 = 8501;
pub const DEFAULT_ENTRY_SCRIPT: &str = "app/main.py";
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STOP_GRACE_MS: u64 = 3_000;
pub const DEFAULT_EXIT_POLL_INTERVAL_MS: u64 = 1_000;

const PROBE_INTERVAL_MIN_MS: u64 = 50;
const PROBE_INTERVAL_MAX_MS: u64 = 10_000;
const STARTUP_TIMEOUT_MIN_SECS: u64 = 1;
const STARTUP_TIMEOUT_MAX_SECS: u64 = 600;
const STOP_GRACE_MAX_MS: u64 = 60_000;
const EXIT_POLL_INTERVAL_MIN_MS: u64 = 10;
const EXIT_POLL_INTERVAL_MAX_MS: u64 = 60_000;

/// Shell settings (stored as `settings.json` in the app config dir)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    pub backend_port: u16,
    pub python_path: Option<PathBuf>,
    pub entry_script: String,
    pub probe_interval_ms: u64,
    pub startup_timeout_secs: u64,
    pub stop_grace_ms: u64,
    pub exit_poll_interval_ms: u64,
    pub backend_env: BTreeMap<String, String>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            backend_port: DEFAULT_BACKEND_PORT,
            python_path: None,
            entry_script: DEFAULT_ENTRY_SCRIPT.to_string(),
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            exit_poll_interval_ms: DEFAULT_EXIT_POLL_INTERVAL_MS,
            backend_env: BTreeMap::new(),
        }
    }
}

/// Timing of the readiness wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbePolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Timing of backend teardown and exit monitoring
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StopPolicy {
    pub grace: Duration,
    pub exit_poll_interval: Duration,
}

impl ShellSettings {
    /// Readiness timing, clamped to the same ranges as the env overrides
    pub fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            interval: Duration::from_millis(
                self.probe_interval_ms
                    .clamp(PROBE_INTERVAL_MIN_MS, PROBE_INTERVAL_MAX_MS),
            ),
            timeout: Duration::from_secs(
                self.startup_timeout_secs
                    .clamp(STARTUP_TIMEOUT_MIN_SECS, STARTUP_TIMEOUT_MAX_SECS),
            ),
        }
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            grace: Duration::from_millis(self.stop_grace_ms.min(STOP_GRACE_MAX_MS)),
            exit_poll_interval: Duration::from_millis(
                self.exit_poll_interval_ms
                    .clamp(EXIT_POLL_INTERVAL_MIN_MS, EXIT_POLL_INTERVAL_MAX_MS),
            ),
        }
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; unparsable values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(env_keys::BACKEND_PORT) {
            match raw.trim().parse::<u16>() {
                Ok(port) if port != 0 => self.backend_port = port,
                _ => tracing::warn!(key = env_keys::BACKEND_PORT, value = %raw, "ignoring invalid port"),
            }
        }

        if let Some(raw) = lookup(env_keys::PYTHON) {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.python_path = Some(PathBuf::from(raw));
            }
        }

        if let Some(raw) = lookup(env_keys::PROBE_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => {
                    self.probe_interval_ms = ms.clamp(PROBE_INTERVAL_MIN_MS, PROBE_INTERVAL_MAX_MS)
                }
                Err(_) => {
                    tracing::warn!(key = env_keys::PROBE_INTERVAL_MS, value = %raw, "ignoring invalid interval")
                }
            }
        }

        if let Some(raw) = lookup(env_keys::STARTUP_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => {
                    self.startup_timeout_secs =
                        secs.clamp(STARTUP_TIMEOUT_MIN_SECS, STARTUP_TIMEOUT_MAX_SECS)
                }
                Err(_) => {
                    tracing::warn!(key = env_keys::STARTUP_TIMEOUT_SECS, value = %raw, "ignoring invalid timeout")
                }
            }
        }

        self
    }
}

/// Load settings from file, falling back to defaults when absent or unreadable
pub fn load(path: &Path) -> anyhow::Result<ShellSettings> {
    if !path.exists() {
        return Ok(ShellSettings::default());
    }

    let content = std::fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt settings file, using defaults");
            Ok(ShellSettings::default())
        }
    }
}

/// Save settings to file
pub fn save(path: &Path, settings: &ShellSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
