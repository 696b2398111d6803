//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use pagechat_pilot::{BrowserHost, DocumentClient, DocumentError, PromptSource};
use pagechat_types::{PageChatConfig, SelectorConfig};

/// State of the last assistant message at some point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: Option<String>,
    pub text: String,
    pub composing: bool,
    pub streaming: bool,
}

/// Assistant message still thinking, no text yet.
pub fn composing(id: &str) -> Snapshot {
    Snapshot {
        id: Some(id.to_string()),
        text: String::new(),
        composing: true,
        streaming: true,
    }
}

/// Assistant message whose text is still growing.
pub fn streaming(id: &str, text: &str) -> Snapshot {
    Snapshot {
        id: Some(id.to_string()),
        text: text.to_string(),
        composing: false,
        streaming: true,
    }
}

/// Finished assistant message.
pub fn done(id: &str, text: &str) -> Snapshot {
    Snapshot {
        id: Some(id.to_string()),
        text: text.to_string(),
        composing: false,
        streaming: false,
    }
}

/// What the page looks like from a given offset (ms since the page opened).
/// `None` means the assistant message list is empty.
pub type Script = Vec<(u64, Option<Snapshot>)>;

/// Everything the operator did to a page.
#[derive(Debug, Default)]
pub struct PageLog {
    pub typed: Vec<String>,
    pub clicks: usize,
    pub polls: usize,
}

/// A chat page whose assistant messages follow a timed script.
///
/// Run under `#[tokio::test(start_paused = true)]` so the script is
/// replayed on virtual time.
pub struct FakeDocument {
    started: Instant,
    script: Script,
    selectors: SelectorConfig,
    pub input_present: bool,
    pub click_fails: bool,
    pub screenshot: Option<Vec<u8>>,
    log: Arc<Mutex<PageLog>>,
}

impl FakeDocument {
    pub fn new(script: Script) -> Self {
        Self {
            started: Instant::now(),
            script,
            selectors: SelectorConfig::default(),
            input_present: true,
            click_fails: false,
            screenshot: None,
            log: Arc::new(Mutex::new(PageLog::default())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<PageLog>> {
        Arc::clone(&self.log)
    }

    fn current(&self) -> Option<Snapshot> {
        let elapsed = self.started.elapsed();
        self.script
            .iter()
            .filter(|(at, _)| Duration::from_millis(*at) <= elapsed)
            .last()
            .and_then(|(_, snapshot)| snapshot.clone())
    }
}

#[async_trait]
impl DocumentClient for FakeDocument {
    type Element = Snapshot;

    async fn find_all(&self, selector: &str) -> Result<Vec<Snapshot>, DocumentError> {
        assert_eq!(selector, self.selectors.assistant_message);
        self.log.lock().unwrap().polls += 1;
        Ok(self.current().into_iter().collect())
    }

    async fn find_one(&self, selector: &str) -> Result<Option<Snapshot>, DocumentError> {
        if selector == self.selectors.prompt_input && self.input_present {
            // The input is not an assistant message; any handle will do.
            return Ok(Some(done("prompt-input", "")));
        }
        Ok(None)
    }

    async fn read_attribute(
        &self,
        element: &Snapshot,
        name: &str,
    ) -> Result<Option<String>, DocumentError> {
        assert_eq!(name, self.selectors.message_id_attribute);
        Ok(element.id.clone())
    }

    async fn read_text(&self, element: &Snapshot) -> Result<String, DocumentError> {
        Ok(element.text.clone())
    }

    async fn has_descendant(
        &self,
        element: &Snapshot,
        selector: &str,
    ) -> Result<bool, DocumentError> {
        if selector == self.selectors.composing_marker {
            Ok(element.composing)
        } else if selector == self.selectors.streaming_marker {
            Ok(element.streaming)
        } else {
            panic!("unexpected marker selector {selector}")
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), DocumentError> {
        if selector != self.selectors.prompt_input || !self.input_present {
            return Err(DocumentError::NotFound {
                selector: selector.to_string(),
            });
        }
        self.log.lock().unwrap().typed.push(text.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DocumentError> {
        if self.click_fails {
            return Err(DocumentError::NotFound {
                selector: selector.to_string(),
            });
        }
        self.log.lock().unwrap().clicks += 1;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Option<Vec<u8>>, DocumentError> {
        Ok(self.screenshot.clone())
    }
}

/// Browser host that serves one scripted page and counts lifecycle calls.
pub struct FakeBrowser {
    page: Option<FakeDocument>,
    pub fail_open: bool,
    pub opened_urls: Vec<String>,
    pub close_page_calls: usize,
    pub shutdown_calls: usize,
}

impl FakeBrowser {
    /// The page's script clock starts when the page is opened.
    pub fn new(script: Script) -> Self {
        Self::with_page(FakeDocument::new(script))
    }

    pub fn with_page(page: FakeDocument) -> Self {
        Self {
            page: Some(page),
            fail_open: false,
            opened_urls: Vec::new(),
            close_page_calls: 0,
            shutdown_calls: 0,
        }
    }
}

#[async_trait]
impl BrowserHost for FakeBrowser {
    type Page = FakeDocument;

    async fn open_page(&mut self, url: &str) -> Result<FakeDocument, DocumentError> {
        self.opened_urls.push(url.to_string());
        if self.fail_open {
            return Err(DocumentError::Navigation {
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        let mut page = self.page.take().expect("page opened twice");
        page.started = Instant::now();
        Ok(page)
    }

    async fn close_page(&mut self, _page: FakeDocument) -> Result<(), DocumentError> {
        self.close_page_calls += 1;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DocumentError> {
        self.shutdown_calls += 1;
        Ok(())
    }
}

/// Default configuration with streaming switched as requested.
pub fn config(streaming: bool) -> PageChatConfig {
    PageChatConfig {
        streaming,
        ..PageChatConfig::default()
    }
}

/// The "Hello" conversation: composing, then "Hi", then "Hi there", then done.
pub fn hello_script() -> Script {
    vec![
        (0, Some(composing("m1"))),
        (300, Some(streaming("m1", "Hi"))),
        (600, Some(streaming("m1", "Hi there"))),
        (900, Some(done("m1", "Hi there"))),
    ]
}

/// An operator who never types anything.
pub struct StalledPrompts;

#[async_trait]
impl PromptSource for StalledPrompts {
    async fn next_prompt(&mut self) -> std::io::Result<Option<String>> {
        std::future::pending().await
    }
}
