//! Submitting a prompt and collecting its reply.

use pagechat_types::PageChatConfig;

use crate::document::DocumentClient;
use crate::error::{DocumentError, PilotError};
use crate::session::Session;
use crate::transcript::Transcript;
use crate::watcher::{Reply, ResponseWatcher, WatchSettings};

/// Runs one turn: type the prompt, press send, watch the reply.
pub struct PromptDispatcher<'a, D: DocumentClient> {
    doc: &'a D,
    config: &'a PageChatConfig,
}

impl<'a, D: DocumentClient> PromptDispatcher<'a, D> {
    pub fn new(doc: &'a D, config: &'a PageChatConfig) -> Self {
        Self { doc, config }
    }

    /// Submit `prompt` and wait for the complete reply.
    ///
    /// A missing prompt input marks the session inactive and returns
    /// [`PilotError::InputNotFound`]. A failed click on the send button is
    /// reported through `transcript` and the reply is watched for anyway.
    pub async fn dispatch(
        &self,
        prompt: &str,
        session: &mut Session,
        transcript: &mut dyn Transcript,
    ) -> Result<Reply, PilotError> {
        let selectors = &self.config.selectors;

        if self.doc.find_one(&selectors.prompt_input).await?.is_none() {
            return Err(self.input_missing(session));
        }

        match self.doc.type_into(&selectors.prompt_input, prompt).await {
            Ok(()) => {}
            Err(DocumentError::NotFound { .. }) => return Err(self.input_missing(session)),
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(chars = prompt.chars().count(), "prompt typed");

        if let Err(source) = self.doc.click(&selectors.send_button).await {
            let err = PilotError::SendActionFailed { source };
            tracing::warn!(error = %err, "send button click failed; watching for a reply anyway");
            transcript.notice(&err.to_string());
        }

        ResponseWatcher::new(
            self.doc,
            selectors,
            WatchSettings::from(&self.config.timing),
        )
        .watch(session, transcript)
        .await
    }

    fn input_missing(&self, session: &mut Session) -> PilotError {
        session.active = false;
        PilotError::InputNotFound {
            selector: self.config.selectors.prompt_input.clone(),
        }
    }
}
