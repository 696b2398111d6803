//! Response detection.
//!
//! After a prompt is submitted, [`ResponseWatcher`] polls the page until the
//! assistant's reply is complete:
//!
//! 1. **Awaiting first token**: wait (bounded) for the last assistant message
//!    to be a new message that is no longer composing, and capture its id.
//! 2. **Streaming**: on every tick re-read the last message. If its id
//!    rotated, adopt the new id and restart the diff; otherwise emit whatever
//!    text is new. The reply is complete once the streaming marker is gone.
//! 3. **Complete**: in batch mode the collected text is emitted once.
//!
//! The completion and first-token signals are both inferred from the absence
//! of a marker element; nothing stronger is available on the page.

use std::time::Duration;

use pagechat_types::{SelectorConfig, TimingConfig};
use tokio::time::Instant;

use crate::diff::TextDiff;
use crate::document::DocumentClient;
use crate::error::PilotError;
use crate::session::Session;
use crate::transcript::Transcript;

/// Bounds and cadence of one watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub first_token_timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound on the streaming phase; `None` waits indefinitely.
    pub stream_limit: Option<Duration>,
}

impl From<&TimingConfig> for WatchSettings {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            first_token_timeout: timing.first_token_timeout(),
            poll_interval: timing.poll_interval(),
            stream_limit: timing.stream_limit(),
        }
    }
}

/// Watch progress, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    AwaitingFirstToken,
    Streaming,
    Complete,
}

/// What a completed watch observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Id of the message the reply was read from, if the page exposes one.
    pub message_id: Option<String>,
    /// Full reconstructed text (concatenation of every emitted fragment).
    pub text: String,
    pub fragments: usize,
    pub elapsed: Duration,
}

/// Observes one reply on a page.
pub struct ResponseWatcher<'a, D: DocumentClient> {
    doc: &'a D,
    selectors: &'a SelectorConfig,
    settings: WatchSettings,
}

impl<'a, D: DocumentClient> ResponseWatcher<'a, D> {
    pub fn new(doc: &'a D, selectors: &'a SelectorConfig, settings: WatchSettings) -> Self {
        Self {
            doc,
            selectors,
            settings,
        }
    }

    /// Wait for the reply to the prompt just submitted and surface it.
    ///
    /// Streaming mode sends each new fragment to `transcript` as it appears;
    /// batch mode sends the whole reply, trailing whitespace trimmed, once it
    /// is complete.
    pub async fn watch(
        &self,
        session: &mut Session,
        transcript: &mut dyn Transcript,
    ) -> Result<Reply, PilotError> {
        let started = Instant::now();

        tracing::debug!(phase = ?WatchPhase::AwaitingFirstToken, "watching for reply");
        self.await_first_token(session).await?;

        tracing::debug!(
            phase = ?WatchPhase::Streaming,
            message_id = ?session.last_message_id,
            "reply started"
        );
        let text = self.stream_until_complete(session, transcript).await?;

        let fragments = text.fragments;
        let text = text.collected;
        if session.streaming_enabled {
            transcript.end_turn();
        } else {
            transcript.reply(text.trim_end());
        }

        let elapsed = started.elapsed();
        tracing::debug!(phase = ?WatchPhase::Complete, ?elapsed, "reply complete");

        Ok(Reply {
            message_id: session.last_message_id.clone(),
            text,
            fragments,
            elapsed,
        })
    }

    async fn await_first_token(&self, session: &mut Session) -> Result<(), PilotError> {
        let previous = session.last_message_id.clone();
        let deadline = Instant::now() + self.settings.first_token_timeout;

        loop {
            let messages = self.doc.find_all(&self.selectors.assistant_message).await?;
            if let Some(last) = messages.last() {
                let id = self
                    .doc
                    .read_attribute(last, &self.selectors.message_id_attribute)
                    .await?;
                let stale = previous.is_some() && id == previous;
                if !stale
                    && !self
                        .doc
                        .has_descendant(last, &self.selectors.composing_marker)
                        .await?
                {
                    session.last_message_id = id;
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(PilotError::InitialResponseTimeout {
                    waited: self.settings.first_token_timeout,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn stream_until_complete(
        &self,
        session: &mut Session,
        transcript: &mut dyn Transcript,
    ) -> Result<Collected, PilotError> {
        let deadline = self.settings.stream_limit.map(|limit| (limit, Instant::now() + limit));
        let mut diff = TextDiff::new();
        let mut collected = Collected::default();

        loop {
            let messages = self.doc.find_all(&self.selectors.assistant_message).await?;
            if let Some(last) = messages.last() {
                let id = self
                    .doc
                    .read_attribute(last, &self.selectors.message_id_attribute)
                    .await?;

                if id.is_none() && session.last_message_id.is_some() {
                    // Mid re-render; not a new message.
                    tracing::trace!("message id momentarily absent; skipping tick");
                } else if id != session.last_message_id {
                    tracing::info!(
                        from = ?session.last_message_id,
                        to = ?id,
                        "assistant message rotated; restarting diff"
                    );
                    session.last_message_id = id;
                    diff.reset();
                } else {
                    let text = self.doc.read_text(last).await?;
                    if let Some(fragment) = diff.advance(&text) {
                        if session.streaming_enabled {
                            transcript.fragment(&fragment);
                        }
                        collected.push(&fragment);
                    }

                    if !self
                        .doc
                        .has_descendant(last, &self.selectors.streaming_marker)
                        .await?
                    {
                        return Ok(collected);
                    }
                }
            }

            // Checked after the read so a reply that completed in time is kept.
            if let Some((limit, at)) = deadline {
                if Instant::now() >= at {
                    return Err(PilotError::StreamingTimeout { limit });
                }
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[derive(Debug, Default)]
struct Collected {
    collected: String,
    fragments: usize,
}

impl Collected {
    fn push(&mut self, fragment: &str) {
        self.collected.push_str(fragment);
        self.fragments += 1;
    }
}
