//! [`DocumentClient`] and [`BrowserHost`] backed by a real Chrome.

use std::time::Duration;

use async_trait::async_trait;
use pagechat_browser::{BrowserDriver, BrowserError, ChromeProcess, LaunchOptions, NodeId};
use pagechat_types::PageChatConfig;

use crate::document::{BrowserHost, DocumentClient};
use crate::error::DocumentError;

/// Build launch options from the effective configuration.
pub fn launch_options(config: &PageChatConfig) -> LaunchOptions {
    LaunchOptions {
        binary: config.browser.binary.clone(),
        headless: config.browser.headless,
        proxy: config.browser.proxy.clone(),
        user_agent: Some(config.page.user_agent.clone()).filter(|ua| !ua.is_empty()),
        startup_timeout: config.browser.startup_timeout(),
    }
}

/// A chat page open in Chrome.
pub struct ChromePage {
    driver: BrowserDriver,
    target_id: String,
    key_delay: Duration,
}

#[async_trait]
impl DocumentClient for ChromePage {
    type Element = NodeId;

    async fn find_all(&self, selector: &str) -> Result<Vec<NodeId>, DocumentError> {
        Ok(self.driver.query_selector_all(selector).await?)
    }

    async fn find_one(&self, selector: &str) -> Result<Option<NodeId>, DocumentError> {
        Ok(self.driver.query_selector(selector).await?)
    }

    async fn read_attribute(
        &self,
        element: &NodeId,
        name: &str,
    ) -> Result<Option<String>, DocumentError> {
        Ok(self.driver.get_attribute(*element, name).await?)
    }

    async fn read_text(&self, element: &NodeId) -> Result<String, DocumentError> {
        Ok(self.driver.text_content(*element).await?)
    }

    async fn has_descendant(&self, element: &NodeId, selector: &str) -> Result<bool, DocumentError> {
        Ok(self
            .driver
            .query_selector_within(*element, selector)
            .await?
            .is_some())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DocumentError> {
        Ok(self.driver.type_text(selector, text, self.key_delay).await?)
    }

    async fn click(&self, selector: &str) -> Result<(), DocumentError> {
        Ok(self.driver.click(selector).await?)
    }

    async fn screenshot(&self) -> Result<Option<Vec<u8>>, DocumentError> {
        Ok(Some(self.driver.screenshot().await?))
    }
}

/// Owns the Chrome process for a session.
pub struct ChromeHost {
    process: ChromeProcess,
    load_timeout: Duration,
    key_delay: Duration,
}

impl ChromeHost {
    /// Start Chrome as configured.
    pub async fn launch(config: &PageChatConfig) -> Result<Self, BrowserError> {
        let process = ChromeProcess::launch(&launch_options(config)).await?;
        tracing::info!(
            browser = %process.info().path.display(),
            version = process.info().version.as_deref().unwrap_or("unknown"),
            "browser started"
        );
        Ok(Self {
            process,
            load_timeout: config.page.load_timeout(),
            key_delay: config.timing.key_delay(),
        })
    }
}

#[async_trait]
impl BrowserHost for ChromeHost {
    type Page = ChromePage;

    async fn open_page(&mut self, url: &str) -> Result<ChromePage, DocumentError> {
        let (target_id, driver) = self.process.open_page().await?;
        let page = ChromePage {
            driver,
            target_id,
            key_delay: self.key_delay,
        };

        match page.driver.navigate_and_wait(url, self.load_timeout).await {
            Ok(()) => {}
            // Single-page chat apps can hold the load event back; the prompt
            // input check decides whether the page is usable.
            Err(BrowserError::PageLoadTimeout { duration }) => {
                tracing::warn!(?duration, url, "page load event not seen; continuing");
            }
            Err(e) => {
                if let Err(close_err) = self.close_page(page).await {
                    tracing::debug!(error = %close_err, "failed to close page after navigation error");
                }
                return Err(e.into());
            }
        }

        match page.driver.get_title().await {
            Ok(title) => tracing::debug!(title = %title, "page loaded"),
            Err(e) => tracing::debug!(error = %e, "could not read page title"),
        }
        Ok(page)
    }

    async fn close_page(&mut self, page: ChromePage) -> Result<(), DocumentError> {
        page.driver.client().close().await;
        self.process.close_target(&page.target_id).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DocumentError> {
        Ok(self.process.shutdown().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn launch_options_follow_config() {
        let mut config = PageChatConfig::default();
        config.browser.binary = Some(PathBuf::from("/opt/chrome/chrome"));
        config.browser.headless = false;
        config.browser.proxy = Some("http://proxy.local:3128".into());

        let options = launch_options(&config);
        assert_eq!(options.binary, Some(PathBuf::from("/opt/chrome/chrome")));
        assert!(!options.headless);
        assert_eq!(options.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(options.user_agent.as_deref(), Some(config.page.user_agent.as_str()));
        assert_eq!(options.startup_timeout, Duration::from_secs(20));
    }

    #[test]
    fn empty_user_agent_keeps_browser_default() {
        let mut config = PageChatConfig::default();
        config.page.user_agent.clear();
        assert!(launch_options(&config).user_agent.is_none());
    }
}
