//! Configuration and error types shared across the pagechat crates.

pub mod config;
pub mod config_loader;
pub mod error;

pub use config::{
    BrowserConfig, PageChatConfig, PageConfig, SelectorConfig, TimingConfig, CONFIG_FILENAME,
    DEFAULT_CHAT_URL, DEFAULT_USER_AGENT,
};
pub use config_loader::{ConfigLoader, ConfigSource, EffectiveConfig};
pub use error::PageChatError;
