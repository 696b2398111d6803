//! High-level page driver wrapping the CDP client.
//!
//! Provides the page operations a chat session needs: navigation, DOM
//! queries (from the document root or scoped to an element), attribute and
//! text reads, clicking, per-character typing, and screenshots.
//!
//! Node ids handed out by CDP stay valid until the next `DOM.getDocument`
//! call. Queries rooted at the document fetch a fresh root, so callers should
//! finish reading a batch of nodes before issuing the next rooted query.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::cdp::CdpClient;
use crate::error::BrowserError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque handle to a DOM node, as returned by CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// Bounding box of a DOM element in CSS pixels.
#[derive(Debug, Clone)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Reads an element's live text through the JS object bound to the node.
const TEXT_CONTENT_FN: &str = "function() { return this.textContent; }";

// ---------------------------------------------------------------------------
// BrowserDriver
// ---------------------------------------------------------------------------

/// Page-level automation driver.
pub struct BrowserDriver {
    client: CdpClient,
}

impl BrowserDriver {
    /// Connect to a page target and enable the Page, DOM and Runtime domains.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let client = CdpClient::connect(ws_url).await?;

        client.enable_domain("Page").await?;
        client.enable_domain("DOM").await?;
        client.enable_domain("Runtime").await?;

        Ok(Self { client })
    }

    /// Create a driver from an existing CDP client.
    pub fn from_client(client: CdpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Navigate to a URL and wait for `Page.loadEventFired`.
    ///
    /// The event subscription is taken before `Page.navigate` is sent so a
    /// fast load cannot slip past.
    pub async fn navigate_and_wait(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let mut events = self.client.subscribe();

        let result = self
            .client
            .send_command("Page.navigate", build_navigate_params(url))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(BrowserError::NavigationFailed {
                reason: error_text.to_string(),
            });
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(evt)) if evt.method == "Page.loadEventFired" => return Ok(()),
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "event subscriber lagged during navigation");
                }
                Ok(Err(RecvError::Closed)) => {
                    return Err(BrowserError::Protocol {
                        detail: "WebSocket closed while waiting for page load".to_string(),
                    });
                }
                Err(_) => return Err(BrowserError::PageLoadTimeout { duration: timeout }),
            }
        }
    }

    // -----------------------------------------------------------------------
    // JavaScript evaluation
    // -----------------------------------------------------------------------

    /// Evaluate a JavaScript expression in the page context.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .client
            .send_command("Runtime.evaluate", build_evaluate_params(expression))
            .await?;
        unwrap_remote_value(&result)
    }

    /// Get the current page title.
    pub async fn get_title(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    // -----------------------------------------------------------------------
    // DOM queries
    // -----------------------------------------------------------------------

    async fn get_document_root(&self) -> Result<NodeId, BrowserError> {
        let result = self
            .client
            .send_command("DOM.getDocument", serde_json::json!({ "depth": 0 }))
            .await?;

        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|n| n.as_i64())
            .map(NodeId)
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getDocument did not return a root nodeId".to_string(),
            })
    }

    /// Find the first element matching a CSS selector in the document.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, BrowserError> {
        let root = self.get_document_root().await?;
        self.query_selector_within(root, selector).await
    }

    /// Find the first descendant of `node` matching a CSS selector.
    pub async fn query_selector_within(
        &self,
        node: NodeId,
        selector: &str,
    ) -> Result<Option<NodeId>, BrowserError> {
        let result = self
            .client
            .send_command("DOM.querySelector", build_query_selector_params(node.0, selector))
            .await?;

        // CDP answers nodeId 0 when nothing matches.
        let node_id = result.get("nodeId").and_then(|n| n.as_i64()).unwrap_or(0);
        Ok((node_id != 0).then_some(NodeId(node_id)))
    }

    /// Find all elements matching a CSS selector, in document order.
    pub async fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, BrowserError> {
        let root = self.get_document_root().await?;

        let result = self
            .client
            .send_command("DOM.querySelectorAll", build_query_selector_params(root.0, selector))
            .await?;

        Ok(node_ids_from(&result))
    }

    /// Read one attribute of an element. `None` when the attribute is absent.
    pub async fn get_attribute(
        &self,
        node: NodeId,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let result = self
            .client
            .send_command("DOM.getAttributes", serde_json::json!({ "nodeId": node.0 }))
            .await?;

        Ok(attribute_from_list(&result, name))
    }

    /// Read the live `textContent` of an element.
    pub async fn text_content(&self, node: NodeId) -> Result<String, BrowserError> {
        let resolved = self
            .client
            .send_command("DOM.resolveNode", serde_json::json!({ "nodeId": node.0 }))
            .await?;

        let object_id = resolved
            .get("object")
            .and_then(|o| o.get("objectId"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| BrowserError::Protocol {
                detail: format!("DOM.resolveNode returned no objectId for node {}", node.0),
            })?
            .to_string();

        let result = self
            .client
            .send_command(
                "Runtime.callFunctionOn",
                serde_json::json!({
                    "objectId": object_id,
                    "functionDeclaration": TEXT_CONTENT_FN,
                    "returnByValue": true,
                }),
            )
            .await;

        if let Err(e) = self
            .client
            .send_command("Runtime.releaseObject", serde_json::json!({ "objectId": object_id }))
            .await
        {
            tracing::debug!(error = %e, "failed to release remote object");
        }

        let value = unwrap_remote_value(&result?)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // -----------------------------------------------------------------------
    // Element interaction
    // -----------------------------------------------------------------------

    async fn get_element_box(&self, node_id: NodeId) -> Result<ElementBox, BrowserError> {
        let result = self
            .client
            .send_command("DOM.getBoxModel", serde_json::json!({ "nodeId": node_id.0 }))
            .await?;

        let content: Vec<f64> = result
            .get("model")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getBoxModel did not return a content quad".to_string(),
            })?
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();

        box_from_quad(&content)
    }

    /// Click the element matched by `selector` at the centre of its box.
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        let (cx, cy) = self.get_element_box(node_id).await?.center();

        for event_type in ["mousePressed", "mouseReleased"] {
            self.client
                .send_command("Input.dispatchMouseEvent", build_click_params(cx, cy, event_type))
                .await?;
        }

        Ok(())
    }

    /// Focus the element matched by `selector` and type `text` one character
    /// at a time, pausing `key_delay` between characters.
    pub async fn type_text(
        &self,
        selector: &str,
        text: &str,
        key_delay: Duration,
    ) -> Result<(), BrowserError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        self.client
            .send_command("DOM.focus", serde_json::json!({ "nodeId": node_id.0 }))
            .await?;

        let mut buf = [0u8; 4];
        for (i, ch) in text.chars().enumerate() {
            if i > 0 && !key_delay.is_zero() {
                tokio::time::sleep(key_delay).await;
            }
            let ch_str: &str = ch.encode_utf8(&mut buf);
            for event_type in ["keyDown", "keyUp"] {
                self.client
                    .send_command("Input.dispatchKeyEvent", build_key_event_params(event_type, ch_str))
                    .await?;
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Screenshots
    // -----------------------------------------------------------------------

    /// Capture the viewport as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .client
            .send_command("Page.captureScreenshot", serde_json::json!({ "format": "png" }))
            .await?;

        let data_b64 = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Page.captureScreenshot did not return 'data' field".to_string(),
            })?;

        B64.decode(data_b64).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to decode screenshot base64: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// CDP parameter builders and response parsers
// ---------------------------------------------------------------------------

pub fn build_navigate_params(url: &str) -> Value {
    serde_json::json!({ "url": url })
}

pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

pub fn build_query_selector_params(node_id: i64, selector: &str) -> Value {
    serde_json::json!({
        "nodeId": node_id,
        "selector": selector,
    })
}

/// Build `Input.dispatchMouseEvent` parameters for a left click at (x, y).
pub fn build_click_params(x: f64, y: f64, event_type: &str) -> Value {
    serde_json::json!({
        "type": event_type,
        "x": x,
        "y": y,
        "button": "left",
        "clickCount": 1,
    })
}

/// Build `Input.dispatchKeyEvent` parameters for one character.
///
/// Only `keyDown` carries `text`; a text-bearing `keyUp` would insert the
/// character a second time.
pub fn build_key_event_params(event_type: &str, text: &str) -> Value {
    if event_type == "keyDown" {
        serde_json::json!({
            "type": event_type,
            "text": text,
            "unmodifiedText": text,
            "key": text,
        })
    } else {
        serde_json::json!({
            "type": event_type,
            "key": text,
        })
    }
}

/// Extract the by-value result of `Runtime.evaluate` / `Runtime.callFunctionOn`,
/// surfacing thrown exceptions as [`BrowserError::JsException`].
pub fn unwrap_remote_value(result: &Value) -> Result<Value, BrowserError> {
    if let Some(exception) = result.get("exceptionDetails") {
        let message = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|d| d.as_str())
            .or_else(|| exception.get("text").and_then(|t| t.as_str()))
            .unwrap_or("unknown exception")
            .to_string();
        return Err(BrowserError::JsException { message });
    }

    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Node ids from a `DOM.querySelectorAll` result, skipping the null id 0.
pub fn node_ids_from(result: &Value) -> Vec<NodeId> {
    result
        .get("nodeIds")
        .and_then(|n| n.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_i64())
                .filter(|id| *id != 0)
                .map(NodeId)
                .collect()
        })
        .unwrap_or_default()
}

/// Look up `name` in a `DOM.getAttributes` result (a flat name/value list).
pub fn attribute_from_list(result: &Value, name: &str) -> Option<String> {
    let list = result.get("attributes")?.as_array()?;
    list.chunks_exact(2)
        .find(|pair| pair[0].as_str() == Some(name))
        .and_then(|pair| pair[1].as_str())
        .map(str::to_string)
}

/// Bounding box of a content quad (`[x1,y1, x2,y2, x3,y3, x4,y4]`).
pub fn box_from_quad(quad: &[f64]) -> Result<ElementBox, BrowserError> {
    if quad.len() < 8 {
        return Err(BrowserError::Protocol {
            detail: format!("content quad has {} values, expected 8", quad.len()),
        });
    }

    let xs = quad.iter().step_by(2);
    let ys = quad.iter().skip(1).step_by(2);
    let min_x = xs.clone().copied().fold(f64::INFINITY, f64::min);
    let max_x = xs.copied().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.clone().copied().fold(f64::INFINITY, f64::min);
    let max_y = ys.copied().fold(f64::NEG_INFINITY, f64::max);

    let width = max_x - min_x;
    let height = max_y - min_y;

    if width <= 0.0 || height <= 0.0 {
        return Err(BrowserError::ElementNotInteractable {
            reason: format!("element has zero or negative size: {width}x{height}"),
        });
    }

    Ok(ElementBox {
        x: min_x,
        y: min_y,
        width,
        height,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
