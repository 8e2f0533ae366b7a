// Text Analysis Desktop - Configuration
// Settings file location and backend runtime resolution for the Tauri shell

use std::path::{Path, PathBuf};

use tauri::{AppHandle, Manager};
use textanalysis_supervisor::config::{self, ShellSettings};
use textanalysis_supervisor::launch::{BackendLayout, LaunchPlan};

/// Overrides the project root used in development builds
const BACKEND_ROOT_ENV: &str = "TEXTANALYSIS_BACKEND_ROOT";

fn settings_path(app: &AppHandle) -> anyhow::Result<PathBuf> {
    let config_dir = app
        .path()
        .app_config_dir()
        .map_err(|e| anyhow::anyhow!("Failed to get app config dir: {}", e))?;
    Ok(config_dir.join("settings.json"))
}

/// Load settings (writing defaults on first run) and apply env overrides
pub fn load_settings(app: &AppHandle) -> anyhow::Result<ShellSettings> {
    let path = settings_path(app)?;
    if !path.exists() {
        if let Err(e) = config::save(&path, &ShellSettings::default()) {
            tracing::warn!(path = %path.display(), error = %e, "could not write default settings");
        }
    }

    let settings = config::load(&path)?.with_env_overrides();
    tracing::info!(
        path = %path.display(),
        port = settings.backend_port,
        timeout_secs = settings.startup_timeout_secs,
        "shell settings loaded"
    );
    Ok(settings)
}

/// Project root in development: `<root>/target/<profile>` is the resource dir
fn dev_root(resource_dir: &Path) -> PathBuf {
    if let Ok(root) = std::env::var(BACKEND_ROOT_ENV) {
        return PathBuf::from(root);
    }

    resource_dir
        .parent() // target
        .and_then(Path::parent) // project root
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve the runtime and build the backend invocation
pub fn launch_plan(app: &AppHandle, settings: &ShellSettings) -> anyhow::Result<LaunchPlan> {
    let resource_dir = app
        .path()
        .resource_dir()
        .map_err(|e| anyhow::anyhow!("Failed to get resource dir: {}", e))?;

    let layout = BackendLayout::resolve(&resource_dir, &dev_root(&resource_dir), settings);
    tracing::info!(
        python = %layout.python.display(),
        app_root = %layout.app_root.display(),
        source = ?layout.source,
        "backend runtime resolved"
    );

    Ok(layout.launch_plan(settings))
}
