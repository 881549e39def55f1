//! Terminal front end for the chat widget.
//!
//! Each line read from stdin is typed into the input and submitted with the
//! Enter key. Replies are printed as their chunks arrive.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::client::HttpChatClient;
use crate::config::AppConfig;
use crate::surface::{ChatLog, ChatSurface, NodeId, Role};
use crate::widget::{ChatWidget, Key, StreamState, WidgetOptions};

/// A [`ChatLog`] that also writes every change to a terminal.
///
/// A terminal cannot rewrite earlier output, so text for a node that is not
/// the one currently being printed starts a new labelled line, and
/// overwrites are printed as a fresh line.
#[derive(Debug)]
pub struct TerminalSurface<W> {
    log: ChatLog,
    out: W,
    cursor: Option<NodeId>,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            log: ChatLog::new(),
            out,
            cursor: None,
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(role: Role) -> &'static str {
        match role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        }
    }

    fn move_to(&mut self, node: NodeId) {
        if self.cursor == Some(node) {
            return;
        }
        let label = self.log.get(node).map_or("?", |m| Self::label(m.role));
        let _ = write!(self.out, "\n{label}: ");
        self.cursor = Some(node);
    }

    // Terminal output is best effort; the log stays authoritative.
    fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> ChatSurface for TerminalSurface<W> {
    fn input_value(&self) -> String {
        self.log.input_value()
    }

    fn set_input(&mut self, value: &str) {
        self.log.set_input(value);
    }

    fn append_message(&mut self, role: Role, text: &str) -> NodeId {
        let node = self.log.append_message(role, text);
        // Echoing the user's own line would duplicate what they just typed.
        if role == Role::Assistant {
            self.move_to(node);
            let _ = write!(self.out, "{text}");
            self.flush();
        }
        node
    }

    fn append_text(&mut self, node: NodeId, text: &str) {
        self.log.append_text(node, text);
        self.move_to(node);
        let _ = write!(self.out, "{text}");
        self.flush();
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.log.set_text(node, text);
        self.cursor = None;
        self.move_to(node);
        let _ = write!(self.out, "{text}");
        self.flush();
    }
}

/// Run the interactive terminal chat until stdin closes.
pub async fn run_chat(config: &AppConfig) -> anyhow::Result<()> {
    let client =
        HttpChatClient::new(&config.widget.origin)?.with_encoding(config.widget.prompt_encoding);
    debug!(
        name: "chat.client.ready",
        origin = %client.origin(),
        encoding = config.widget.prompt_encoding.as_str(),
        "Terminal chat ready"
    );

    let widget = ChatWidget::new(
        TerminalSurface::new(std::io::stdout()),
        Arc::new(client),
        WidgetOptions::from(&config.widget),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        widget
            .surface()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .set_input(&line);

        if let Some(reply) = widget.on_key(Key::Enter) {
            let outcome = reply.join().await;
            if outcome != StreamState::Completed {
                debug!(state = ?outcome, "Reply did not complete");
            }
            println!();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamed_text_prints_inline() {
        let mut surface = TerminalSurface::new(Vec::new());
        surface.append_message(Role::User, "hi");
        let reply = surface.append_message(Role::Assistant, "");
        surface.append_text(reply, "Hel");
        surface.append_text(reply, "lo");

        assert_eq!(surface.log().text(reply), Some("Hello"));
        let printed = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(printed, "\nAssistant: Hello");
    }

    #[test]
    fn test_interleaved_replies_get_fresh_labels() {
        let mut surface = TerminalSurface::new(Vec::new());
        let a = surface.append_message(Role::Assistant, "");
        let b = surface.append_message(Role::Assistant, "");
        surface.append_text(a, "one");
        surface.append_text(b, "two");

        let printed = String::from_utf8(surface.into_inner()).unwrap();
        assert_eq!(printed, "\nAssistant: \nAssistant: \nAssistant: one\nAssistant: two");
    }

    #[test]
    fn test_overwrite_prints_new_line() {
        let mut surface = TerminalSurface::new(Vec::new());
        let reply = surface.append_message(Role::Assistant, "");
        surface.append_text(reply, "Hel");
        surface.set_text(reply, "Error fetching text stream.");

        assert_eq!(surface.log().text(reply), Some("Error fetching text stream."));
        let printed = String::from_utf8(surface.into_inner()).unwrap();
        assert!(printed.ends_with("Hel\nAssistant: Error fetching text stream."));
    }
}
