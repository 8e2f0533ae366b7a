// Text Analysis Desktop - Native operations
// Tauri implementation of the IPC boundary's privileged operations

use async_trait::async_trait;
use tauri::{AppHandle, Manager};
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_notification::NotificationExt;
use textanalysis_supervisor::ipc::{
    CaptureRegion, CapturedImage, DialogMode, FileDialogRequest, ShellHost, WindowAction,
};
use textanalysis_supervisor::IpcError;

use crate::capture;
use crate::window::MAIN_WINDOW;

pub struct TauriShellHost {
    app: AppHandle,
}

impl TauriShellHost {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

fn host_error(e: impl std::fmt::Display) -> IpcError {
    IpcError::Host(e.to_string())
}

#[async_trait]
impl ShellHost for TauriShellHost {
    fn app_version(&self) -> String {
        self.app.package_info().version.to_string()
    }

    fn window_control(&self, action: WindowAction) -> Result<(), IpcError> {
        let window = self
            .app
            .get_webview_window(MAIN_WINDOW)
            .ok_or_else(|| IpcError::Host("main window is gone".to_string()))?;

        match action {
            WindowAction::Minimize => window.minimize(),
            WindowAction::Maximize => {
                if window.is_maximized().map_err(host_error)? {
                    window.unmaximize()
                } else {
                    window.maximize()
                }
            }
            WindowAction::Close => window.close(),
        }
        .map_err(host_error)
    }

    async fn capture_screen(&self, region: Option<CaptureRegion>) -> Result<CapturedImage, IpcError> {
        tauri::async_runtime::spawn_blocking(move || capture::capture_primary(region))
            .await
            .map_err(host_error)?
    }

    async fn file_dialog(&self, request: FileDialogRequest) -> Result<Option<String>, IpcError> {
        let mut builder = self.app.dialog().file();
        if let Some(title) = request.title {
            builder = builder.set_title(title);
        }
        if let Some(name) = request.default_name {
            builder = builder.set_file_name(name);
        }
        for filter in &request.filters {
            let extensions: Vec<&str> = filter.extensions.iter().map(String::as_str).collect();
            builder = builder.add_filter(filter.name.clone(), &extensions);
        }

        let mode = request.mode;
        let picked = tauri::async_runtime::spawn_blocking(move || match mode {
            DialogMode::Open => builder.blocking_pick_file(),
            DialogMode::Save => builder.blocking_save_file(),
        })
        .await
        .map_err(host_error)?;

        Ok(picked.map(|path| path.to_string()))
    }

    fn show_notification(&self, title: &str, body: &str) -> Result<(), IpcError> {
        let mut builder = self.app.notification().builder().title(title);
        if !body.is_empty() {
            builder = builder.body(body);
        }
        builder.show().map_err(host_error)
    }
}
