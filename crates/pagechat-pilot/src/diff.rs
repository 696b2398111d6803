//! Incremental text diffing for a growing reply.
//!
//! The page re-renders the whole reply on every update, so each read returns
//! the full text so far. [`TextDiff`] remembers what has already been emitted
//! and turns a new reading into the fragment that is actually new.

/// Baseline of text already emitted for the current message.
#[derive(Debug, Default, Clone)]
pub struct TextDiff {
    emitted: String,
}

impl TextDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the baseline. Used when the watched message changes.
    pub fn reset(&mut self) {
        self.emitted.clear();
    }

    /// Text emitted so far for the current message.
    pub fn baseline(&self) -> &str {
        &self.emitted
    }

    /// Compare a fresh reading against the baseline and return the new part.
    ///
    /// - Growth (`current` extends the baseline): the suffix is returned and
    ///   becomes part of the baseline.
    /// - Shrink (`current` is a prefix of the baseline, including an empty
    ///   reading): treated as a transient render; nothing is returned and the
    ///   baseline is kept, so the text is never emitted twice.
    /// - Divergence (the page rewrote earlier text): the characters past the
    ///   baseline's length are returned and `current` becomes the baseline.
    pub fn advance(&mut self, current: &str) -> Option<String> {
        if let Some(suffix) = current.strip_prefix(self.emitted.as_str()) {
            if suffix.is_empty() {
                return None;
            }
            let fragment = suffix.to_string();
            self.emitted.push_str(&fragment);
            return Some(fragment);
        }

        if self.emitted.starts_with(current) {
            tracing::trace!(
                baseline_len = self.emitted.len(),
                current_len = current.len(),
                "reply text shrank; keeping baseline"
            );
            return None;
        }

        let seen = self.emitted.chars().count();
        let fragment: String = current.chars().skip(seen).collect();
        tracing::debug!(seen, "reply text diverged from what was already emitted");
        self.emitted = current.to_string();
        (!fragment.is_empty()).then_some(fragment)
    }
}
