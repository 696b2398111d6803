//! Reading follow-up prompts from the operator.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Marker printed before each operator prompt.
pub const PROMPT_MARKER: &str = "\n►: ";

/// Source of the prompts after the first one.
#[async_trait]
pub trait PromptSource: Send {
    /// The next line typed by the operator, or `None` at end of input.
    async fn next_prompt(&mut self) -> std::io::Result<Option<String>>;
}

/// Whether `line` asks to end the session.
pub fn is_exit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("exit")
}

/// Line-oriented prompts from stdin.
pub struct StdinPrompts {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinPrompts {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinPrompts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptSource for StdinPrompts {
    async fn next_prompt(&mut self) -> std::io::Result<Option<String>> {
        {
            let mut out = std::io::stdout().lock();
            out.write_all(PROMPT_MARKER.as_bytes())?;
            out.flush()?;
        }
        let line = self.lines.next_line().await?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }
}

/// Prompts served from a fixed list, then end of input.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompts {
    lines: std::collections::VecDeque<String>,
}

impl ScriptedPrompts {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Lines not yet handed out.
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl PromptSource for ScriptedPrompts {
    async fn next_prompt(&mut self) -> std::io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}
