//! Configuration types for a pagechat session.
//!
//! [`PageChatConfig`] is the merged configuration produced by
//! [`ConfigLoader`](crate::config_loader::ConfigLoader). Every section falls
//! back to defaults that target the public ChatGPT page, so an empty file (or
//! no file at all) is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the config file looked up in `~/.pagechat/` and `./.pagechat/`.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Chat page opened when no URL is configured.
pub const DEFAULT_CHAT_URL: &str = "https://chat.openai.com";

/// Mobile Safari user agent; the mobile layout serves the chat without login.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4_1 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3.1 Mobile/15E148 Safari/604.1";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PageChatConfig {
    /// Emit reply fragments as they arrive instead of one final string.
    pub streaming: bool,
    pub page: PageConfig,
    pub selectors: SelectorConfig,
    pub timing: TimingConfig,
    pub browser: BrowserConfig,
}

impl Default for PageChatConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            page: PageConfig::default(),
            selectors: SelectorConfig::default(),
            timing: TimingConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

/// The chat page to open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PageConfig {
    pub url: String,
    pub user_agent: String,
    /// How long to wait for the page load event after navigation.
    pub load_timeout_secs: u64,
    /// Where to write a PNG of the page when the prompt input cannot be found.
    pub failure_screenshot: Option<PathBuf>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHAT_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            load_timeout_secs: 30,
            failure_screenshot: None,
        }
    }
}

impl PageConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

/// CSS selectors and attribute names describing the chat page markup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectorConfig {
    /// The prompt text area.
    pub prompt_input: String,
    /// The button that submits the prompt.
    pub send_button: String,
    /// One element per assistant message, in document order.
    pub assistant_message: String,
    /// Attribute on an assistant message carrying its stable id.
    pub message_id_attribute: String,
    /// Present inside a message while the assistant is still thinking.
    pub composing_marker: String,
    /// Present inside a message while its text may still grow.
    pub streaming_marker: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            prompt_input: "#prompt-textarea".to_string(),
            send_button: "[data-testid=\"send-button\"]".to_string(),
            assistant_message: "div[data-message-author-role=\"assistant\"]".to_string(),
            message_id_attribute: "data-message-id".to_string(),
            composing_marker: ".result-thinking".to_string(),
            streaming_marker: ".result-streaming".to_string(),
        }
    }
}

/// Polling cadence and bounds for one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Give up on a turn if no assistant message qualifies within this bound.
    pub first_token_timeout_ms: u64,
    /// Interval between two reads of the page.
    pub poll_interval_ms: u64,
    /// Pause between two typed characters.
    pub key_delay_ms: u64,
    /// Upper bound on the streaming phase. Unset means unbounded.
    pub stream_limit_secs: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            first_token_timeout_ms: 30_000,
            poll_interval_ms: 100,
            key_delay_ms: 100,
            stream_limit_secs: None,
        }
    }
}

impl TimingConfig {
    pub fn first_token_timeout(&self) -> Duration {
        Duration::from_millis(self.first_token_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn key_delay(&self) -> Duration {
        Duration::from_millis(self.key_delay_ms)
    }

    pub fn stream_limit(&self) -> Option<Duration> {
        self.stream_limit_secs.map(Duration::from_secs)
    }
}

/// How to launch the controlled browser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome/Chromium binary. Discovered on the system when unset.
    pub binary: Option<PathBuf>,
    pub headless: bool,
    /// Outbound proxy server, e.g. `http://proxy.local:3128`.
    pub proxy: Option<String>,
    /// How long to wait for Chrome to print its DevTools endpoint.
    pub startup_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: None,
            headless: true,
            proxy: None,
            startup_timeout_secs: 20,
        }
    }
}

impl BrowserConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_public_chat_page() {
        let config = PageChatConfig::default();
        assert!(config.streaming);
        assert_eq!(config.page.url, DEFAULT_CHAT_URL);
        assert_eq!(config.selectors.prompt_input, "#prompt-textarea");
        assert_eq!(config.selectors.streaming_marker, ".result-streaming");
        assert_eq!(config.timing.first_token_timeout(), Duration::from_secs(30));
        assert_eq!(config.timing.poll_interval(), Duration::from_millis(100));
        assert!(config.timing.stream_limit().is_none());
        assert!(config.browser.headless);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: PageChatConfig = toml::from_str("").unwrap();
        assert_eq!(config, PageChatConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: PageChatConfig = toml::from_str(
            r#"
            streaming = false

            [timing]
            stream_limit_secs = 600
            "#,
        )
        .unwrap();
        assert!(!config.streaming);
        assert_eq!(config.timing.stream_limit(), Some(Duration::from_secs(600)));
        assert_eq!(config.timing.poll_interval_ms, 100);
        assert_eq!(config.selectors, SelectorConfig::default());
    }
}
