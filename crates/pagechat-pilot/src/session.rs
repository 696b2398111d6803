//! The interactive chat session.
//!
//! [`InteractiveSession`] owns the browser and the chat page for the whole
//! conversation. It runs the first prompt, then keeps reading prompts from the
//! operator until `exit`, end of input, a fatal error, or interruption. On
//! every one of those paths the page and then the browser are released, once.

use std::future::Future;
use std::time::Duration;

use pagechat_types::PageChatConfig;

use crate::dispatcher::PromptDispatcher;
use crate::document::{BrowserHost, DocumentClient};
use crate::error::PilotError;
use crate::operator::{is_exit_command, PromptSource};
use crate::transcript::Transcript;
use crate::watcher::Reply;

/// Conversation state shared by the dispatcher and the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Emit fragments as they arrive instead of one reply per turn.
    pub streaming_enabled: bool,
    pub proxy: Option<String>,
    pub active: bool,
    /// Id of the assistant message the last turn read from.
    pub last_message_id: Option<String>,
}

impl Session {
    pub fn new(streaming_enabled: bool, proxy: Option<String>) -> Self {
        Self {
            streaming_enabled,
            proxy,
            active: true,
            last_message_id: None,
        }
    }
}

/// Running totals, logged when the session closes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub turns_completed: u32,
    pub first_token_timeouts: u32,
    pub streaming_timeouts: u32,
    pub chars_received: usize,
    pub time_in_replies: Duration,
}

impl SessionStats {
    fn record_reply(&mut self, reply: &Reply) {
        self.turns_completed += 1;
        self.chars_received += reply.text.chars().count();
        self.time_in_replies += reply.elapsed;
    }

    fn record_failure(&mut self, err: &PilotError) {
        match err {
            PilotError::InitialResponseTimeout { .. } => self.first_token_timeouts += 1,
            PilotError::StreamingTimeout { .. } => self.streaming_timeouts += 1,
            _ => {}
        }
    }
}

/// One conversation on one page.
pub struct InteractiveSession<H: BrowserHost> {
    host: H,
    page: Option<H::Page>,
    config: PageChatConfig,
    session: Session,
    stats: SessionStats,
    released: bool,
}

impl<H: BrowserHost> InteractiveSession<H> {
    pub fn new(host: H, config: PageChatConfig) -> Self {
        let session = Session::new(config.streaming, config.browser.proxy.clone());
        Self {
            host,
            page: None,
            config,
            session,
            stats: SessionStats::default(),
            released: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run the conversation to its end and release the browser.
    ///
    /// `shutdown` resolves when the operator interrupts (Ctrl-C); the active
    /// turn is dropped at whatever point it is suspended and the session goes
    /// straight to release. Turn-level failures (timeouts, a failed send
    /// click) are reported through `transcript` and the conversation goes on.
    pub async fn run<P, T, S>(
        &mut self,
        first_prompt: &str,
        prompts: &mut P,
        transcript: &mut T,
        shutdown: S,
    ) -> Result<SessionStats, PilotError>
    where
        P: PromptSource,
        T: Transcript,
        S: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            biased;
            () = shutdown => Err(PilotError::Interrupted),
            result = self.drive(first_prompt, prompts, transcript) => result,
        };
        self.session.active = false;

        match &outcome {
            Ok(()) => {}
            Err(PilotError::Interrupted) => {
                tracing::info!("interrupted by operator");
                transcript.notice("Interrupted by user, closing...");
            }
            Err(err @ PilotError::InputNotFound { .. }) => {
                tracing::error!(error = %err, url = %self.config.page.url, "prompt input missing");
                transcript.notice(&format!(
                    "{err}. Check that {} is reachable without logging in from this network or proxy.",
                    self.config.page.url
                ));
                self.save_failure_screenshot().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "session failed");
                transcript.notice(&format!("An error occurred: {err}"));
            }
        }

        self.release().await;
        outcome.map(|()| self.stats.clone())
    }

    async fn drive<P, T>(
        &mut self,
        first_prompt: &str,
        prompts: &mut P,
        transcript: &mut T,
    ) -> Result<(), PilotError>
    where
        P: PromptSource,
        T: Transcript,
    {
        let page = self.host.open_page(&self.config.page.url).await?;
        let page = self.page.insert(page);
        tracing::info!(url = %self.config.page.url, "chat page ready");

        let mut pending = Some(first_prompt.to_string());
        while self.session.active {
            let prompt = match pending.take() {
                Some(prompt) => prompt,
                None => match prompts.next_prompt().await.map_err(PilotError::Operator)? {
                    None => {
                        tracing::info!("end of operator input");
                        break;
                    }
                    Some(line) if is_exit_command(&line) => {
                        tracing::info!("operator requested exit");
                        break;
                    }
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => line,
                },
            };

            let turn = PromptDispatcher::new(&*page, &self.config)
                .dispatch(&prompt, &mut self.session, transcript)
                .await;

            match turn {
                Ok(reply) => {
                    tracing::info!(
                        message_id = ?reply.message_id,
                        chars = reply.text.chars().count(),
                        fragments = reply.fragments,
                        elapsed_ms = reply.elapsed.as_millis() as u64,
                        "turn complete"
                    );
                    self.stats.record_reply(&reply);
                }
                Err(err) if !err.is_session_fatal() => {
                    tracing::warn!(error = %err, "turn abandoned");
                    transcript.notice(&err.to_string());
                    self.stats.record_failure(&err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Close the page, then stop the browser. Only the first call does anything.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(page) = self.page.take() {
            if let Err(e) = self.host.close_page(page).await {
                tracing::warn!(error = %e, "failed to close the chat page");
            }
        }
        if let Err(e) = self.host.shutdown().await {
            tracing::warn!(error = %e, "failed to stop the browser");
        }

        tracing::info!(
            turns = self.stats.turns_completed,
            first_token_timeouts = self.stats.first_token_timeouts,
            streaming_timeouts = self.stats.streaming_timeouts,
            chars = self.stats.chars_received,
            "session closed"
        );
    }

    async fn save_failure_screenshot(&self) {
        let (Some(path), Some(page)) = (&self.config.page.failure_screenshot, &self.page) else {
            return;
        };
        match page.screenshot().await {
            Ok(Some(png)) => match tokio::fs::write(path, png).await {
                Ok(()) => tracing::info!(path = %path.display(), "saved page screenshot"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save screenshot"),
            },
            Ok(None) => tracing::debug!("page backend cannot take screenshots"),
            Err(e) => tracing::warn!(error = %e, "failed to capture screenshot"),
        }
    }
}
