//! Assistant text buffer.

/// Holds the assistant text currently on display and the text committed at the
/// last turn boundary.
///
/// Each `assistant` frame carries fully committed text, so a new frame
/// replaces the in-flight text rather than extending it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamAssembler {
    current: String,
    committed: String,
}

impl StreamAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the in-flight text with `text`.
    ///
    /// Returns `false` when the text is unchanged.
    pub fn append_or_set(&mut self, text: &str) -> bool {
        if self.current == text {
            return false;
        }
        text.clone_into(&mut self.current);
        true
    }

    /// Text currently on display.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Text committed at the last turn boundary.
    #[must_use]
    pub fn committed(&self) -> &str {
        &self.committed
    }

    /// End the turn: the in-flight text becomes the committed text and the
    /// display buffer is emptied.
    ///
    /// Returns the committed text, or `None` if there was nothing in flight.
    pub fn commit(&mut self) -> Option<&str> {
        if self.current.is_empty() {
            return None;
        }
        self.committed = std::mem::take(&mut self.current);
        Some(&self.committed)
    }

    /// Drop both buffers. Returns whether anything was cleared.
    pub fn clear(&mut self) -> bool {
        let had_text = !self.current.is_empty() || !self.committed.is_empty();
        self.current.clear();
        self.committed.clear();
        had_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_replace_current_text() {
        let mut assembler = StreamAssembler::new();
        assert!(assembler.append_or_set("Hello"));
        assert!(assembler.append_or_set("Hello, world"));
        assert!(!assembler.append_or_set("Hello, world"));
        assert_eq!(assembler.current(), "Hello, world");
        assert_eq!(assembler.committed(), "");
    }

    #[test]
    fn test_commit_moves_text_once() {
        let mut assembler = StreamAssembler::new();
        assembler.append_or_set("answer");

        assert_eq!(assembler.commit(), Some("answer"));
        assert_eq!(assembler.current(), "");
        assert_eq!(assembler.committed(), "answer");

        // A second boundary with nothing in flight keeps the committed text.
        assert_eq!(assembler.commit(), None);
        assert_eq!(assembler.committed(), "answer");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut assembler = StreamAssembler::new();
        assembler.append_or_set("draft");
        assembler.commit();
        assembler.append_or_set("next");

        assert!(assembler.clear());
        assert!(!assembler.clear());
        assert_eq!(assembler, StreamAssembler::default());
    }
}
