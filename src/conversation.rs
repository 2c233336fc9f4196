use crate::models::{ChatRole, Message};

/// The ordered, append-only conversation transcript.
///
/// Owned by the engine state; the scheduler and providers only ever see the
/// flattened rendering from [`ConversationState::format_for_prompt`].
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(ChatRole::User, content));
    }

    pub fn append_system(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(ChatRole::System, content));
    }

    /// Assistant turns are stored with the speaker label folded into the
    /// content (`"<label>: <text>"`), which is exactly how the other model
    /// sees them in the formatted history.
    pub fn append_assistant(&mut self, label: &str, content: &str) {
        let mut message = Message::new(ChatRole::Assistant, format!("{}: {}", label, content));
        message.speaker = Some(label.to_string());
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Flatten the transcript into the provider-agnostic prompt body. This
    /// rendering is the only context a collaborating model receives of prior
    /// turns; no structured history is ever sent.
    pub fn format_for_prompt(&self) -> String {
        let mut formatted = String::new();
        for message in &self.messages {
            let label = match message.role {
                ChatRole::System => "System",
                ChatRole::User => "Human",
                ChatRole::Assistant => "AI",
            };
            formatted.push_str(label);
            formatted.push_str(": ");
            formatted.push_str(&message.content);
            formatted.push_str("\n\n");
        }
        formatted
    }

    /// The only destructive operation on the transcript.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_renders_role_labels_exactly() {
        let mut convo = ConversationState::new();
        convo.append_system("S");
        convo.append_user("U");
        convo.append_assistant("M", "A");
        assert_eq!(
            convo.format_for_prompt(),
            "System: S\n\nHuman: U\n\nAI: M: A\n\n"
        );
    }

    #[test]
    fn format_of_empty_transcript_is_empty() {
        assert_eq!(ConversationState::new().format_for_prompt(), "");
    }

    #[test]
    fn assistant_turns_carry_speaker_label() {
        let mut convo = ConversationState::new();
        convo.append_assistant("llama3", "hello");
        let last = convo.messages().last().unwrap();
        assert_eq!(last.speaker.as_deref(), Some("llama3"));
        assert_eq!(last.content, "llama3: hello");
    }

    #[test]
    fn clear_empties_transcript() {
        let mut convo = ConversationState::new();
        convo.append_user("hi");
        convo.clear();
        assert!(convo.is_empty());
    }
}
