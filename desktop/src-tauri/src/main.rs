// Text Analysis Desktop - Tauri v2
// Main entry point

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod capture;
mod config;
mod host;
mod window;

use std::sync::{Arc, OnceLock};

use host::TauriShellHost;
use tauri::{AppHandle, Manager, RunEvent, State, WindowEvent};
use textanalysis_supervisor::{logging, IpcBoundary, IpcError, IpcResponse, Supervisor};
use window::TauriShellUi;

/// Handle for the panic hook, set once setup has run
static FAULT_HANDLE: OnceLock<AppHandle> = OnceLock::new();

/// The only command the hosted UI can invoke
#[tauri::command]
async fn shell_ipc(
    ipc: State<'_, Arc<IpcBoundary>>,
    request: serde_json::Value,
) -> Result<IpcResponse, IpcError> {
    ipc.handle(request).await
}

/// Log the fault, take the backend down with us and tell the user
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(class = "unhandledShellFault", %info, "shell panicked");

        if let Some(app) = FAULT_HANDLE.get() {
            if let Some(supervisor) = app.try_state::<Arc<Supervisor>>() {
                supervisor.stop_now();
            }
            window::report_fault(app, &info.to_string());
        }
        default_hook(info);
    }));
}

fn shutdown(app: &AppHandle) {
    let Some(supervisor) = app.try_state::<Arc<Supervisor>>() else {
        return;
    };
    let supervisor = supervisor.inner().clone();

    tracing::info!("application exiting, stopping backend");
    tauri::async_runtime::block_on(async move {
        if let Err(e) = supervisor.stop().await {
            tracing::error!(error = %e, "backend did not stop cleanly");
        }
    });
}

fn main() {
    logging::init();
    install_panic_hook();

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_notification::init())
        .setup(|app| {
            let handle = app.handle().clone();
            let _ = FAULT_HANDLE.set(handle.clone());

            let settings = config::load_settings(&handle)?;
            let plan = config::launch_plan(&handle, &settings)?;
            tracing::info!(command = %plan.debug_command(), "backend launch plan");

            let ui = Arc::new(TauriShellUi::new(handle.clone()));
            let supervisor = Arc::new(Supervisor::new(plan, &settings, ui));
            let ipc = IpcBoundary::new(
                Arc::new(TauriShellHost::new(handle.clone())),
                supervisor.clone(),
            );
            app.manage(supervisor.clone());
            app.manage(Arc::new(ipc));

            tauri::async_runtime::spawn(async move {
                match supervisor.start().await {
                    Ok(()) => supervisor.monitor().await,
                    Err(e) => {
                        tracing::error!(error = %e, class = ?e.class(), "backend launch aborted")
                    }
                }
            });

            Ok(())
        })
        .on_window_event(|win, event| {
            if win.label() != window::MAIN_WINDOW {
                return;
            }
            if let WindowEvent::Destroyed = event {
                win.state::<Arc<Supervisor>>().main_window_closed();
            }
        })
        .invoke_handler(tauri::generate_handler![shell_ipc])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app, event| match event {
        // Closing the last window keeps the app (and backend) alive on macOS
        RunEvent::ExitRequested { code: None, api, .. } if cfg!(target_os = "macos") => {
            api.prevent_exit();
        }
        RunEvent::Exit => shutdown(app),
        #[cfg(target_os = "macos")]
        RunEvent::Reopen {
            has_visible_windows: false,
            ..
        } => {
            let supervisor = app.state::<Arc<Supervisor>>();
            if let Err(e) = supervisor.reopen_main_window() {
                tracing::error!(error = %e, "failed to reopen main window");
            }
        }
        _ => {}
    });
}
