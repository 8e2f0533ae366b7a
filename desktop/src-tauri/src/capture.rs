// Text Analysis Desktop - Screen capture
// Primary-display screenshots for the ebook OCR workflow

use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, RgbaImage};
use textanalysis_supervisor::ipc::{CaptureRegion, CapturedImage};
use textanalysis_supervisor::IpcError;

/// Capture the primary display, optionally cropped, as base64 PNG.
/// Blocking; run it off the async runtime.
pub fn capture_primary(region: Option<CaptureRegion>) -> Result<CapturedImage, IpcError> {
    let monitors = xcap::Monitor::all().map_err(|e| classify_capture_error(&e.to_string()))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary().unwrap_or(false))
        .or_else(|| monitors.first())
        .ok_or_else(|| IpcError::Host("no display available for capture".to_string()))?;

    let screen = monitor
        .capture_image()
        .map_err(|e| classify_capture_error(&e.to_string()))?;

    let image = match region {
        Some(region) => crop(&screen, region)?,
        None => screen,
    };
    encode_png(&image)
}

fn crop(screen: &RgbaImage, region: CaptureRegion) -> Result<RgbaImage, IpcError> {
    let area = region
        .clamp_to(screen.width(), screen.height())
        .ok_or_else(|| IpcError::InvalidPayload("capture region lies outside the screen".to_string()))?;
    Ok(image::imageops::crop_imm(screen, area.x, area.y, area.width, area.height).to_image())
}

fn encode_png(image: &RgbaImage) -> Result<CapturedImage, IpcError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| IpcError::Host(format!("failed to encode capture: {e}")))?;

    Ok(CapturedImage {
        width: image.width(),
        height: image.height(),
        format: "png".to_string(),
        data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

/// Screen-recording refusals surface as `PermissionDenied`
fn classify_capture_error(message: &str) -> IpcError {
    let lower = message.to_lowercase();
    if ["permission", "denied", "not authorized", "access"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        tracing::warn!(error = message, "screen capture refused by the OS");
        IpcError::PermissionDenied(message.to_string())
    } else {
        IpcError::Host(format!("screen capture failed: {message}"))
    }
}
