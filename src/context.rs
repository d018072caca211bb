//! Rolling transcript of the conversation, rendered as a plain-text block
//! suitable for inclusion in downstream prompts or knowledge uploads.

use chrono::Local;

#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<String>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one utterance with a wall-clock timestamp and the emotional
    /// state the agent held at the time.
    pub fn new_message(&mut self, speaker: &str, message: &str, emotion: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.entries.push(format!(
            "[{}] [master_emotion:{}] {}: {}\n",
            timestamp, emotion, speaker, message
        ));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render the whole log as one text block.
    pub fn render(&self) -> String {
        let mut out = String::from("Begin\n");
        for entry in &self.entries {
            out.push_str(entry);
        }
        out.push_str("End\n\n");
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log_renders_frame_only() {
        let log = ConversationLog::new();
        assert!(log.is_empty());
        assert_eq!(log.render(), "Begin\nEnd\n\n");
    }

    #[test]
    fn test_messages_render_in_order() {
        let mut log = ConversationLog::new();
        log.new_message("master", "hello", "neutral");
        log.new_message("assistant", "hi there", "happy");

        let rendered = log.render();
        assert!(rendered.starts_with("Begin\n"));
        assert!(rendered.ends_with("End\n\n"));
        let hello = rendered.find("master: hello").unwrap();
        let hi = rendered.find("assistant: hi there").unwrap();
        assert!(hello < hi);
        assert!(rendered.contains("[master_emotion:happy]"));
    }

    #[test]
    fn test_clear_discards_entries() {
        let mut log = ConversationLog::new();
        log.new_message("master", "hello", "neutral");
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }
}
