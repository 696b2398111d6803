//! Chat-turn control over a rendered chat page.
//!
//! A turn is: type the prompt, press send, then watch the page until the
//! assistant's reply stops streaming, surfacing new text as it appears.
//! [`InteractiveSession`] strings turns together and guarantees the browser
//! is released however the conversation ends.
//!
//! Everything above [`document`] is backend-agnostic; [`chrome`] provides the
//! Chrome implementation used by the `pagechat` binary.

pub mod chrome;
pub mod diff;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod operator;
pub mod session;
pub mod transcript;
pub mod watcher;

pub use chrome::{ChromeHost, ChromePage};
pub use diff::TextDiff;
pub use dispatcher::PromptDispatcher;
pub use document::{BrowserHost, DocumentClient};
pub use error::{DocumentError, PilotError};
pub use operator::{is_exit_command, PromptSource, ScriptedPrompts, StdinPrompts};
pub use session::{InteractiveSession, Session, SessionStats};
pub use transcript::{ConsoleTranscript, RecordingTranscript, Transcript};
pub use watcher::{Reply, ResponseWatcher, WatchPhase, WatchSettings};
