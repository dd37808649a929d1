//! Full-page screenshot as a single batch.
//!
//! The page is navigated and its load event awaited, the viewport is resized
//! to the body's box model, and a PNG is captured. Every step after the
//! first reads its params from slots filled by earlier steps.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Value, json};
use switchyard::{Batch, CancellationToken, Multiplexer, Slot};

use crate::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
struct Document {
    root: Node,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    node_id: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct BoxModel {
    model: Dimensions,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct Dimensions {
    width: i64,
    height: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Capture {
    data: String,
}

/// Declares the screenshot steps and returns the slot receiving the
/// base64-encoded image.
fn plan(url: &str) -> (Batch, Slot<Capture>) {
    let mut batch = Batch::new();
    let _enabled: Slot<IgnoredAny> = batch.call("Page.enable", Value::Null);
    let _navigated: Slot<IgnoredAny> = batch.call("Page.navigate", json!({ "url": url }));
    let _loaded: Slot<IgnoredAny> = batch.listen("Page.loadEventFired");

    let document: Slot<Document> = batch.call("DOM.getDocument", Value::Null);
    let body: Slot<Node> = batch.call_with("DOM.querySelector", move || {
        let root = document.get().unwrap_or_default().root;
        Ok(json!({ "nodeId": root.node_id, "selector": "body" }))
    });
    let layout: Slot<BoxModel> = batch.call_with("DOM.getBoxModel", move || {
        let node = body.get().unwrap_or_default();
        Ok(json!({ "nodeId": node.node_id }))
    });
    let _resized: Slot<IgnoredAny> =
        batch.call_with("Emulation.setDeviceMetricsOverride", move || {
            let size = layout.get().unwrap_or_default().model;
            Ok(json!({
                "width": size.width,
                "height": size.height,
                "deviceScaleFactor": 0,
                "mobile": false,
            }))
        });
    let capture: Slot<Capture> = batch.call("Page.captureScreenshot", Value::Null);
    (batch, capture)
}

/// Runs the screenshot batch and returns the decoded PNG bytes.
pub(crate) async fn capture(
    mux: &Multiplexer,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, AppError> {
    let (batch, image) = plan(url);
    batch.run(mux, cancel).await?;
    let encoded = image.take().ok_or(AppError::MissingScreenshot)?;
    STANDARD
        .decode(encoded.data)
        .map_err(AppError::DecodeScreenshot)
}
