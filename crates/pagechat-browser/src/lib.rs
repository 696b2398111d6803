//! Chrome DevTools Protocol plumbing for pagechat.
//!
//! - **`cdp`**: WebSocket client with JSON-RPC command/response correlation
//!   and a bounded event fan-out.
//! - **`driver`**: `BrowserDriver`, the page-level operations a chat session
//!   needs (navigate, query, read attributes and text, click, type,
//!   screenshot).
//! - **`discovery`**: locating a Chrome/Chromium binary on this machine.
//! - **`launch`**: starting a throwaway headless browser and opening page
//!   targets on it.
//!
//! ```ignore
//! use pagechat_browser::{ChromeProcess, LaunchOptions};
//!
//! let mut chrome = ChromeProcess::launch(&LaunchOptions::default()).await?;
//! let (target, page) = chrome.open_page().await?;
//! page.navigate_and_wait("https://example.com", Duration::from_secs(30)).await?;
//! let title = page.get_title().await?;
//! chrome.close_target(&target).await?;
//! chrome.shutdown().await?;
//! ```

pub mod cdp;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod launch;

pub use cdp::{CdpClient, CdpEvent};
pub use discovery::{discover_chrome, ChromeChannel, ChromeInfo};
pub use driver::{BrowserDriver, NodeId};
pub use error::BrowserError;
pub use launch::{ChromeProcess, LaunchOptions};
