//! Error types for the pagechat-pilot crate.

use std::time::Duration;

use pagechat_browser::BrowserError;
use thiserror::Error;

/// Failures reported by a [`DocumentClient`](crate::document::DocumentClient)
/// or [`BrowserHost`](crate::document::BrowserHost).
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Nothing on the page matches the selector.
    #[error("element not found: {selector}")]
    NotFound { selector: String },

    /// The page could not be opened or navigated.
    #[error("navigation failed: {reason}")]
    Navigation { reason: String },

    /// Any other failure of the automation backend.
    #[error(transparent)]
    Backend(BrowserError),
}

impl From<BrowserError> for DocumentError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::ElementNotFound { selector } => Self::NotFound { selector },
            BrowserError::NavigationFailed { reason } => Self::Navigation { reason },
            BrowserError::PageLoadTimeout { duration } => Self::Navigation {
                reason: format!("page did not finish loading within {duration:?}"),
            },
            other => Self::Backend(other),
        }
    }
}

/// Failures of a chat turn or session.
#[derive(Debug, Error)]
pub enum PilotError {
    /// The prompt input is missing from the page, usually because the page
    /// asks for a login or is not a chat page at all.
    #[error("cannot find the prompt input ({selector}) on the page")]
    InputNotFound { selector: String },

    #[error("failed to submit the prompt: {source}")]
    SendActionFailed {
        #[source]
        source: DocumentError,
    },

    #[error("timed out after {waited:?} waiting for the initial response")]
    InitialResponseTimeout { waited: Duration },

    #[error("reply still streaming after {limit:?}; abandoning this turn")]
    StreamingTimeout { limit: Duration },

    #[error("interrupted by user")]
    Interrupted,

    #[error("failed to read the next prompt: {0}")]
    Operator(#[source] std::io::Error),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl PilotError {
    /// Whether this error ends the session.
    ///
    /// A failed click and either watcher timeout only end the current turn;
    /// everything else (missing input, interruption, backend failures) stops
    /// the session and releases the browser.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SendActionFailed { .. }
                | Self::InitialResponseTimeout { .. }
                | Self::StreamingTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_level_errors_are_not_fatal() {
        let errors = [
            PilotError::SendActionFailed {
                source: DocumentError::NotFound {
                    selector: "button".into(),
                },
            },
            PilotError::InitialResponseTimeout {
                waited: Duration::from_secs(30),
            },
            PilotError::StreamingTimeout {
                limit: Duration::from_secs(120),
            },
        ];
        for err in errors {
            assert!(!err.is_session_fatal(), "{err} should not be fatal");
        }
    }

    #[test]
    fn session_level_errors_are_fatal() {
        assert!(PilotError::InputNotFound {
            selector: "#prompt-textarea".into()
        }
        .is_session_fatal());
        assert!(PilotError::Interrupted.is_session_fatal());
        assert!(PilotError::Document(DocumentError::Navigation {
            reason: "net::ERR_NAME_NOT_RESOLVED".into()
        })
        .is_session_fatal());
    }

    #[test]
    fn browser_errors_map_onto_document_errors() {
        let not_found: DocumentError = BrowserError::ElementNotFound {
            selector: "#x".into(),
        }
        .into();
        assert!(matches!(not_found, DocumentError::NotFound { selector } if selector == "#x"));

        let load: DocumentError = BrowserError::PageLoadTimeout {
            duration: Duration::from_secs(3),
        }
        .into();
        assert!(matches!(load, DocumentError::Navigation { .. }));

        let other: DocumentError = BrowserError::ChromeNotFound.into();
        assert!(matches!(other, DocumentError::Backend(BrowserError::ChromeNotFound)));
    }

    #[test]
    fn timeout_display_names_the_wait() {
        let err = PilotError::InitialResponseTimeout {
            waited: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 30s waiting for the initial response"
        );
    }
}
