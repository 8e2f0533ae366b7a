// Text Analysis Desktop - IPC Boundary
// The closed set of native operations the hosted UI may request

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IpcError;
use crate::supervisor::Supervisor;

pub const OPERATIONS: [&str; 6] = [
    "getAppVersion",
    "getPlatform",
    "windowControl",
    "captureScreen",
    "fileDialog",
    "showNotification",
];

/// OS family tag handed to the UI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Windows,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Other => "other",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAction {
    Minimize,
    Maximize,
    Close,
}

/// Screen region in physical pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    /// Intersect with a `width` x `height` image; `None` if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<CaptureRegion> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clamped = CaptureRegion {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (clamped.width > 0 && clamped.height > 0).then_some(clamped)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub data_base64: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogMode {
    Open,
    Save,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDialogRequest {
    pub mode: DialogMode,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filters: Vec<FileFilter>,
    #[serde(default)]
    pub default_name: Option<String>,
}

/// The webview gets exactly six operations, addressed by an `op` tag:
///
/// | op | payload | response |
/// |---|---|---|
/// | `getAppVersion` | none | `{ kind: "version", version }` |
/// | `getPlatform` | none | `{ kind: "platform", platform }` |
/// | `windowControl` | `{ action: "minimize" \| "maximize" \| "close" }` | `{ kind: "ack" }` |
/// | `captureScreen` | `{ region?: { x, y, width, height } }` | `{ kind: "image", ... }` |
/// | `fileDialog` | `{ mode: "open" \| "save", title?, filters?, defaultName? }` | `{ kind: "dialog", path, cancelled }` |
/// | `showNotification` | `{ title, body }` | `{ kind: "ack" }` |
///
/// Anything else is rejected before it reaches the host. There is no
/// operation that spawns processes or runs commands.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IpcRequest {
    GetAppVersion,
    GetPlatform,
    WindowControl { action: WindowAction },
    CaptureScreen { region: Option<CaptureRegion> },
    FileDialog(FileDialogRequest),
    ShowNotification { title: String, body: String },
}

impl IpcRequest {
    /// Parse a raw request, rejecting operations outside the closed set
    pub fn parse(value: Value) -> Result<Self, IpcError> {
        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| IpcError::InvalidPayload("missing `op`".to_string()))?;

        if !OPERATIONS.contains(&op) {
            return Err(IpcError::UnsupportedOperation(op.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    pub fn operation(&self) -> &'static str {
        match self {
            IpcRequest::GetAppVersion => OPERATIONS[0],
            IpcRequest::GetPlatform => OPERATIONS[1],
            IpcRequest::WindowControl { .. } => OPERATIONS[2],
            IpcRequest::CaptureScreen { .. } => OPERATIONS[3],
            IpcRequest::FileDialog(_) => OPERATIONS[4],
            IpcRequest::ShowNotification { .. } => OPERATIONS[5],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IpcResponse {
    Version { version: String },
    Platform { platform: Platform },
    Ack,
    Image(CapturedImage),
    Dialog { path: Option<String>, cancelled: bool },
}

/// Privileged native operations, implemented by the desktop shell
#[async_trait]
pub trait ShellHost: Send + Sync {
    fn app_version(&self) -> String;

    fn window_control(&self, action: WindowAction) -> Result<(), IpcError>;

    async fn capture_screen(&self, region: Option<CaptureRegion>) -> Result<CapturedImage, IpcError>;

    /// `Ok(None)` when the user cancels
    async fn file_dialog(&self, request: FileDialogRequest) -> Result<Option<String>, IpcError>;

    fn show_notification(&self, title: &str, body: &str) -> Result<(), IpcError>;
}

/// Whether the main window exists yet
pub trait WindowPresence: Send + Sync {
    fn has_main_window(&self) -> bool;
}

impl WindowPresence for Supervisor {
    fn has_main_window(&self) -> bool {
        Supervisor::has_main_window(self)
    }
}

pub struct IpcBoundary {
    host: Arc<dyn ShellHost>,
    window: Arc<dyn WindowPresence>,
}

impl IpcBoundary {
    pub fn new(host: Arc<dyn ShellHost>, window: Arc<dyn WindowPresence>) -> Self {
        Self { host, window }
    }

    /// Entry point for raw webview requests
    pub async fn handle(&self, request: Value) -> Result<IpcResponse, IpcError> {
        let request = match IpcRequest::parse(request) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejected ipc request");
                return Err(e);
            }
        };
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: IpcRequest) -> Result<IpcResponse, IpcError> {
        let op = request.operation();
        tracing::debug!(op, "ipc request");

        let response = match request {
            IpcRequest::GetAppVersion => Ok(IpcResponse::Version {
                version: self.host.app_version(),
            }),
            IpcRequest::GetPlatform => Ok(IpcResponse::Platform {
                platform: Platform::current(),
            }),
            IpcRequest::WindowControl { action } => {
                if self.window.has_main_window() {
                    self.host.window_control(action)?;
                } else {
                    tracing::debug!(?action, "no main window yet, ignoring");
                }
                Ok(IpcResponse::Ack)
            }
            IpcRequest::CaptureScreen { region } => {
                if matches!(region, Some(r) if r.width == 0 || r.height == 0) {
                    return Err(IpcError::InvalidPayload("empty capture region".to_string()));
                }
                self.host.capture_screen(region).await.map(IpcResponse::Image)
            }
            IpcRequest::FileDialog(request) => {
                let path = self.host.file_dialog(request).await?;
                Ok(IpcResponse::Dialog {
                    cancelled: path.is_none(),
                    path,
                })
            }
            IpcRequest::ShowNotification { title, body } => {
                if title.trim().is_empty() {
                    return Err(IpcError::InvalidPayload("notification title is empty".to_string()));
                }
                self.host.show_notification(&title, &body)?;
                Ok(IpcResponse::Ack)
            }
        };

        if let Err(e) = &response {
            tracing::warn!(op, error = %e, class = ?e.class(), "ipc request failed");
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeHost {
        window_actions: Mutex<Vec<WindowAction>>,
        notifications: Mutex<Vec<(String, String)>>,
        deny_capture: bool,
        dialog_path: Option<String>,
    }

    #[async_trait]
    impl ShellHost for FakeHost {
        fn app_version(&self) -> String {
            "0.1.0".to_string()
        }

        fn window_control(&self, action: WindowAction) -> Result<(), IpcError> {
            self.window_actions.lock().unwrap().push(action);
            Ok(())
        }

        async fn capture_screen(&self, region: Option<CaptureRegion>) -> Result<CapturedImage, IpcError> {
            if self.deny_capture {
                return Err(IpcError::PermissionDenied("screen recording".to_string()));
            }
            let (width, height) = region.map(|r| (r.width, r.height)).unwrap_or((1920, 1080));
            Ok(CapturedImage {
                width,
                height,
                format: "png".to_string(),
                data_base64: String::new(),
            })
        }

        async fn file_dialog(&self, _request: FileDialogRequest) -> Result<Option<String>, IpcError> {
            Ok(self.dialog_path.clone())
        }

        fn show_notification(&self, title: &str, body: &str) -> Result<(), IpcError> {
            self.notifications
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct Presence(AtomicBool);

    impl WindowPresence for Presence {
        fn has_main_window(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn boundary(host: FakeHost, window_open: bool) -> (IpcBoundary, Arc<FakeHost>, Arc<Presence>) {
        let host = Arc::new(host);
        let presence = Arc::new(Presence(AtomicBool::new(window_open)));
        (
            IpcBoundary::new(host.clone(), presence.clone()),
            host,
            presence,
        )
    }

    #[tokio::test]
    async fn rejects_operations_outside_the_closed_set() {
        let (ipc, _, _) = boundary(FakeHost::default(), true);

        for op in ["spawnProcess", "exec", "readFile", "getappversion", ""] {
            let err = ipc.handle(json!({ "op": op })).await.unwrap_err();
            assert!(
                matches!(&err, IpcError::UnsupportedOperation(name) if name == op),
                "{op}: {err:?}"
            );
        }

        let err = ipc.handle(json!({ "command": "getAppVersion" })).await.unwrap_err();
        assert!(matches!(err, IpcError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn malformed_payloads_are_invalid() {
        let (ipc, _, _) = boundary(FakeHost::default(), true);

        let err = ipc
            .handle(json!({ "op": "windowControl", "action": "fullscreen" }))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::InvalidPayload(_)));

        let err = ipc
            .handle(json!({ "op": "showNotification", "title": "Done" }))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn version_and_platform_have_no_side_effects() {
        let (ipc, host, _) = boundary(FakeHost::default(), false);

        let version = ipc.handle(json!({ "op": "getAppVersion" })).await.unwrap();
        assert_eq!(
            serde_json::to_value(&version).unwrap(),
            json!({ "kind": "version", "version": "0.1.0" })
        );

        let platform = ipc.handle(json!({ "op": "getPlatform" })).await.unwrap();
        assert_eq!(
            platform,
            IpcResponse::Platform {
                platform: Platform::current()
            }
        );
        assert!(host.window_actions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_commands_are_no_ops_before_the_window_exists() {
        let (ipc, host, presence) = boundary(FakeHost::default(), false);

        let response = ipc
            .handle(json!({ "op": "windowControl", "action": "minimize" }))
            .await
            .unwrap();
        assert_eq!(response, IpcResponse::Ack);
        assert!(host.window_actions.lock().unwrap().is_empty());

        presence.0.store(true, Ordering::SeqCst);
        for action in ["minimize", "maximize", "close"] {
            ipc.handle(json!({ "op": "windowControl", "action": action }))
                .await
                .unwrap();
        }
        assert_eq!(
            *host.window_actions.lock().unwrap(),
            vec![WindowAction::Minimize, WindowAction::Maximize, WindowAction::Close]
        );
    }

    #[tokio::test]
    async fn capture_permission_denial_is_returned_to_the_caller() {
        let host = FakeHost {
            deny_capture: true,
            ..FakeHost::default()
        };
        let (ipc, _, _) = boundary(host, true);

        let err = ipc.handle(json!({ "op": "captureScreen" })).await.unwrap_err();
        assert!(matches!(err, IpcError::PermissionDenied(_)));
        assert_eq!(err.class(), crate::error::ErrorClass::PermissionDenied);
    }

    #[tokio::test]
    async fn capture_passes_region_through() {
        let (ipc, _, _) = boundary(FakeHost::default(), true);

        let response = ipc
            .handle(json!({
                "op": "captureScreen",
                "region": { "x": 10, "y": 20, "width": 300, "height": 400 }
            }))
            .await
            .unwrap();
        match response {
            IpcResponse::Image(image) => assert_eq!((image.width, image.height), (300, 400)),
            other => panic!("unexpected response: {other:?}"),
        }

        let err = ipc
            .handle(json!({
                "op": "captureScreen",
                "region": { "x": 0, "y": 0, "width": 0, "height": 10 }
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn file_dialog_reports_choice_or_cancellation() {
        let host = FakeHost {
            dialog_path: Some("/home/reader/notes.md".to_string()),
            ..FakeHost::default()
        };
        let (ipc, _, _) = boundary(host, true);
        let request = json!({
            "op": "fileDialog",
            "mode": "open",
            "title": "Import document",
            "filters": [{ "name": "Documents", "extensions": ["pdf", "txt", "md"] }]
        });

        assert_eq!(
            ipc.handle(request.clone()).await.unwrap(),
            IpcResponse::Dialog {
                path: Some("/home/reader/notes.md".to_string()),
                cancelled: false
            }
        );

        let (ipc, _, _) = boundary(FakeHost::default(), true);
        assert_eq!(
            ipc.handle(json!({ "op": "fileDialog", "mode": "save", "defaultName": "comparison.md" }))
                .await
                .unwrap(),
            IpcResponse::Dialog {
                path: None,
                cancelled: true
            }
        );
    }

    #[tokio::test]
    async fn notifications_need_a_title() {
        let (ipc, host, _) = boundary(FakeHost::default(), true);

        ipc.handle(json!({ "op": "showNotification", "title": "OCR finished", "body": "42 pages" }))
            .await
            .unwrap();
        assert_eq!(
            *host.notifications.lock().unwrap(),
            vec![("OCR finished".to_string(), "42 pages".to_string())]
        );

        let err = ipc
            .handle(json!({ "op": "showNotification", "title": "  ", "body": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::InvalidPayload(_)));
    }

    #[test]
    fn file_dialog_request_uses_camel_case() {
        let request = IpcRequest::parse(json!({
            "op": "fileDialog",
            "mode": "save",
            "defaultName": "summary.txt"
        }))
        .unwrap();
        assert_eq!(
            request,
            IpcRequest::FileDialog(FileDialogRequest {
                mode: DialogMode::Save,
                title: None,
                filters: vec![],
                default_name: Some("summary.txt".to_string()),
            })
        );
        assert_eq!(request.operation(), "fileDialog");
    }

    #[test]
    fn capture_region_is_clamped_to_image() {
        let region = CaptureRegion { x: 100, y: 50, width: 5000, height: 100 };
        assert_eq!(
            region.clamp_to(1920, 1080),
            Some(CaptureRegion { x: 100, y: 50, width: 1820, height: 100 })
        );
        assert_eq!(
            CaptureRegion { x: 1920, y: 0, width: 10, height: 10 }.clamp_to(1920, 1080),
            None
        );
    }
}
