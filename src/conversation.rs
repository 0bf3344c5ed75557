use uuid::Uuid;

pub const GREETING: &str = "Hello! Welcome to Aura. How can I help you today? 😊";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    User,
    Assistant,
}

impl Origin {
    pub fn css_class(self) -> &'static str {
        match self {
            Origin::User => "message user-message",
            Origin::Assistant => "message assistant-message",
        }
    }
}

/// One displayed chat line. Rendered as plain text, never as markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub origin: Origin,
    pub text: String,
}

impl Message {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Origin::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Origin::Assistant, text)
    }
}

/// Messages of one chat panel plus the "assistant is typing" placeholder,
/// which always renders after the last message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    messages: Vec<Message>,
    typing: bool,
}

impl Default for ConversationView {
    fn default() -> Self {
        Self::greeting()
    }
}

impl ConversationView {
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            typing: false,
        }
    }

    /// A view holding only the canned welcome line.
    pub fn greeting() -> Self {
        let mut view = Self::empty();
        view.push(Message::assistant(GREETING));
        view
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn show_typing(&mut self) {
        self.typing = true;
    }

    /// Safe to call when nothing is showing.
    pub fn hide_typing(&mut self) {
        self.typing = false;
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// Drops every message and leaves the greeting behind. The typing
    /// placeholder is left as it was.
    pub fn reset(&mut self) {
        let typing = self.typing;
        *self = Self::greeting();
        self.typing = typing;
    }
}
