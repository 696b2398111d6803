//! Error types for the pagechat-browser crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while launching or driving the browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to establish a WebSocket connection to Chrome DevTools.
    #[error("failed to connect to Chrome DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A CDP command returned an error response.
    #[error("CDP error {code}: {message}")]
    CdpError {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// A CDP command timed out waiting for a response.
    #[error("CDP command '{method}' timed out after {duration:?}")]
    Timeout { method: String, duration: Duration },

    /// A protocol-level error (serialization, unexpected message format, etc.).
    #[error("CDP protocol error: {detail}")]
    Protocol { detail: String },

    /// The requested DOM element was not found.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    #[error("JavaScript exception: {message}")]
    JsException { message: String },

    #[error("page load timed out after {duration:?}")]
    PageLoadTimeout { duration: Duration },

    /// An element could not be interacted with (e.g., not visible, zero-size).
    #[error("element not interactable: {reason}")]
    ElementNotInteractable { reason: String },

    #[error("no Chrome or Chromium binary found on this system")]
    ChromeNotFound,

    #[error("invalid browser binary `{path}`: {reason}")]
    InvalidBinaryPath { path: String, reason: String },

    /// Chrome started but never announced its DevTools endpoint.
    #[error("browser launch failed: {reason}")]
    LaunchFailed { reason: String },

    #[error("browser I/O error: {0}")]
    Io(#[from] std::io::Error),
}
