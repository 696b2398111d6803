//! Where reply text and diagnostics go.

use std::io::Write;

/// Sink for everything the operator sees during a session.
pub trait Transcript: Send {
    /// A streamed piece of the reply, printed without a line break.
    fn fragment(&mut self, text: &str);

    /// A complete reply in batch mode.
    fn reply(&mut self, text: &str);

    /// A diagnostic line (timeouts, send failures, shutdown notices).
    fn notice(&mut self, line: &str);

    /// Called when a streamed reply is complete.
    fn end_turn(&mut self) {}
}

/// Writes the transcript to stdout, flushing after every fragment.
#[derive(Debug, Default)]
pub struct ConsoleTranscript {
    mid_line: bool,
}

impl ConsoleTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "failed to write to stdout");
        }
    }

    fn finish_line(&mut self) {
        if self.mid_line {
            self.write("\n");
            self.mid_line = false;
        }
    }
}

impl Transcript for ConsoleTranscript {
    fn fragment(&mut self, text: &str) {
        self.write(text);
        self.mid_line = !text.ends_with('\n');
    }

    fn reply(&mut self, text: &str) {
        self.finish_line();
        self.write(&format!("{text}\n"));
    }

    fn notice(&mut self, line: &str) {
        self.finish_line();
        self.write(&format!("{line}\n"));
    }

    fn end_turn(&mut self) {
        self.finish_line();
    }
}

/// Keeps the transcript in memory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingTranscript {
    pub fragments: Vec<String>,
    pub replies: Vec<String>,
    pub notices: Vec<String>,
    pub turns_ended: usize,
}

impl RecordingTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// All streamed fragments joined together.
    pub fn streamed(&self) -> String {
        self.fragments.concat()
    }
}

impl Transcript for RecordingTranscript {
    fn fragment(&mut self, text: &str) {
        self.fragments.push(text.to_string());
    }

    fn reply(&mut self, text: &str) {
        self.replies.push(text.to_string());
    }

    fn notice(&mut self, line: &str) {
        self.notices.push(line.to_string());
    }

    fn end_turn(&mut self) {
        self.turns_ended += 1;
    }
}
