//! The page the widget draws on.
//!
//! A surface owns an input field and a scrollable log of message nodes. The
//! widget only ever appends nodes, writes text into them, and reads or clears
//! the input; layout and styling belong to the surface.

use tracing::warn;

/// Handle to one message node in a surface's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A rendered message. Lives only as long as the surface holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

/// Mutable view the widget renders into.
pub trait ChatSurface: Send {
    /// Current value of the input field.
    fn input_value(&self) -> String;

    /// Replace the input field's value.
    fn set_input(&mut self, value: &str);

    fn clear_input(&mut self) {
        self.set_input("");
    }

    /// Append a message node to the end of the log.
    fn append_message(&mut self, role: Role, text: &str) -> NodeId;

    /// Append text to an existing node.
    fn append_text(&mut self, node: NodeId, text: &str);

    /// Overwrite the text of an existing node.
    fn set_text(&mut self, node: NodeId, text: &str);
}

/// In-memory chat log: an input buffer plus an ordered list of nodes.
#[derive(Debug, Default, Clone)]
pub struct ChatLog {
    input: String,
    messages: Vec<Message>,
}

impl ChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, node: NodeId) -> Option<&Message> {
        self.messages.get(node.0)
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.get(node).map(|m| m.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn node_mut(&mut self, node: NodeId) -> Option<&mut Message> {
        let found = self.messages.get_mut(node.0);
        if found.is_none() {
            warn!(node = node.0, "Write to unknown message node ignored");
        }
        found
    }
}

impl ChatSurface for ChatLog {
    fn input_value(&self) -> String {
        self.input.clone()
    }

    fn set_input(&mut self, value: &str) {
        value.clone_into(&mut self.input);
    }

    fn append_message(&mut self, role: Role, text: &str) -> NodeId {
        self.messages.push(Message {
            role,
            text: text.to_string(),
        });
        NodeId(self.messages.len() - 1)
    }

    fn append_text(&mut self, node: NodeId, text: &str) {
        if let Some(message) = self.node_mut(node) {
            message.text.push_str(text);
        }
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(message) = self.node_mut(node) {
            text.clone_into(&mut message.text);
        }
    }
}
