// Text Analysis Desktop - Main window and dialogs
// Tauri implementation of the supervisor's UI hooks

use std::sync::Arc;

use tauri::{AppHandle, Manager, Url, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use textanalysis_supervisor::ipc::Platform;
use textanalysis_supervisor::navigation::{Navigation, NavigationPolicy};
use textanalysis_supervisor::process::BackendExit;
use textanalysis_supervisor::{Supervisor, SupervisorError};

pub const MAIN_WINDOW: &str = "main";
const APP_TITLE: &str = "Text Analysis";
const BRIDGE_TEMPLATE: &str = include_str!("bridge.js");

fn bridge_script() -> String {
    BRIDGE_TEMPLATE.replace("__PLATFORM__", Platform::current().as_str())
}

fn open_external(app: &AppHandle, url: &Url) {
    use tauri_plugin_opener::OpenerExt;

    tracing::info!(url = %url, "opening link in system browser");
    if let Err(e) = app.opener().open_url(url.as_str(), None::<&str>) {
        tracing::warn!(url = %url, error = %e, "failed to open external link");
    }
}

pub struct TauriShellUi {
    app: AppHandle,
}

impl TauriShellUi {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl textanalysis_supervisor::ShellUi for TauriShellUi {
    fn open_main_window(&self, url: &str) -> anyhow::Result<()> {
        let target: Url = url.parse()?;
        let policy = NavigationPolicy::new(url)?;
        let handle = self.app.clone();

        let window = WebviewWindowBuilder::new(&self.app, MAIN_WINDOW, WebviewUrl::External(target))
            .title(APP_TITLE)
            .inner_size(1280.0, 860.0)
            .min_inner_size(900.0, 600.0)
            .initialization_script(&bridge_script())
            .on_navigation(move |next| match policy.decide(next) {
                Navigation::InWindow => true,
                Navigation::External => {
                    open_external(&handle, next);
                    false
                }
                Navigation::Blocked => {
                    tracing::warn!(url = %next, "blocked navigation");
                    false
                }
            })
            .build()?;

        let _ = window.set_focus();
        Ok(())
    }

    fn reload_main_window(&self, url: &str) -> anyhow::Result<()> {
        let window = self
            .app
            .get_webview_window(MAIN_WINDOW)
            .ok_or_else(|| anyhow::anyhow!("main window is gone"))?;
        window.navigate(url.parse()?)?;
        let _ = window.set_focus();
        Ok(())
    }

    fn report_startup_failure(&self, error: &SupervisorError) {
        let app = self.app.clone();
        self.app
            .dialog()
            .message(format!(
                "The analysis backend could not be started.\n\n{error}\n\nCheck that the bundled Python runtime is intact, then launch the app again."
            ))
            .title(format!("{APP_TITLE} failed to start"))
            .kind(MessageDialogKind::Error)
            .show(move |_| app.exit(1));
    }

    fn report_restart_failure(&self, error: &SupervisorError) {
        let app = self.app.clone();
        self.app
            .dialog()
            .message(format!(
                "The analysis backend could not be restarted.\n\n{error}"
            ))
            .title(format!("{APP_TITLE} backend stopped"))
            .kind(MessageDialogKind::Warning)
            .buttons(MessageDialogButtons::OkCancelCustom(
                "Try again".to_string(),
                "Quit".to_string(),
            ))
            .show(move |retry| offer_restart(app, retry));
    }

    fn report_crash(&self, exit: BackendExit) {
        let app = self.app.clone();
        self.app
            .dialog()
            .message(format!(
                "The analysis backend stopped unexpectedly ({exit}).\n\nRestart it to continue working."
            ))
            .title(format!("{APP_TITLE} backend stopped"))
            .kind(MessageDialogKind::Warning)
            .buttons(MessageDialogButtons::OkCancelCustom(
                "Restart".to_string(),
                "Quit".to_string(),
            ))
            .show(move |restart| offer_restart(app, restart));
    }
}

/// Crash and restart-failure dialogs: restart the backend or quit
fn offer_restart(app: AppHandle, restart: bool) {
    if !restart {
        app.exit(0);
        return;
    }
    let supervisor = app.state::<Arc<Supervisor>>().inner().clone();
    tauri::async_runtime::spawn(async move {
        if let Err(e) = supervisor.restart().await {
            tracing::error!(error = %e, "backend restart failed");
        }
    });
}

/// Last-resort notice for a shell fault; the app exits once it is dismissed
pub fn report_fault(app: &AppHandle, message: &str) {
    let handle = app.clone();
    app.dialog()
        .message(format!("{APP_TITLE} hit an unexpected error and must close.\n\n{message}"))
        .title(APP_TITLE)
        .kind(MessageDialogKind::Error)
        .show(move |_| handle.exit(1));
}
