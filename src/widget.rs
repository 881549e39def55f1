//! The chat widget.
//!
//! [`ChatWidget`] ties a [`ChatSurface`] to a [`ChatTransport`]. Each
//! submission appends a user node and an empty assistant node, then spawns a
//! task that streams the reply into the assistant node chunk by chunk.
//!
//! # Reply lifecycle
//!
//! ```text
//! Idle -> RequestSent -> Streaming -> Completed
//!              |             |
//!              +-------------+------> Failed | Cancelled
//! ```
//!
//! A failed reply has its node overwritten with the widget's error message
//! (any partial text is discarded). A cancelled reply keeps whatever text had
//! arrived.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::ChatTransport;
use crate::config::WidgetConfig;
use crate::decoder::Utf8StreamDecoder;
use crate::error::{ChatError, Result};
use crate::surface::{ChatSurface, NodeId, Role};

/// Text shown in place of a reply that failed.
pub const DEFAULT_ERROR_MESSAGE: &str = "Error fetching text stream.";

/// State of one reply stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    RequestSent,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// Key pressed while focus is in the input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Char(char),
    Other,
}

/// Behaviour knobs for a [`ChatWidget`].
#[derive(Debug, Clone)]
pub struct WidgetOptions {
    /// Replaces the assistant node's text when a reply fails.
    pub error_message: String,
    /// Cancel the in-flight reply when a new message is submitted.
    pub cancel_previous: bool,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self {
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            cancel_previous: false,
        }
    }
}

impl From<&WidgetConfig> for WidgetOptions {
    fn from(config: &WidgetConfig) -> Self {
        Self {
            error_message: config.error_message.clone(),
            cancel_previous: config.cancel_previous,
        }
    }
}

/// Handle to a spawned reply.
#[derive(Debug)]
pub struct ReplyHandle {
    node: NodeId,
    state: watch::Receiver<StreamState>,
    token: CancellationToken,
    task: JoinHandle<StreamState>,
}

impl ReplyHandle {
    /// The assistant node this reply writes into.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Latest observed state.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Stop reading the stream. Text already rendered is kept.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the reply to reach a terminal state.
    pub async fn join(self) -> StreamState {
        self.task.await.unwrap_or(StreamState::Failed)
    }
}

/// Chat widget bound to one surface and one transport.
pub struct ChatWidget<S, T: ?Sized> {
    surface: Arc<Mutex<S>>,
    transport: Arc<T>,
    options: Arc<WidgetOptions>,
    active: Mutex<Option<CancellationToken>>,
}

impl<S, T: ?Sized> std::fmt::Debug for ChatWidget<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWidget")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S, T> ChatWidget<S, T>
where
    S: ChatSurface + 'static,
    T: ChatTransport + ?Sized + 'static,
{
    pub fn new(surface: S, transport: Arc<T>, options: WidgetOptions) -> Self {
        Self {
            surface: Arc::new(Mutex::new(surface)),
            transport,
            options: Arc::new(options),
            active: Mutex::new(None),
        }
    }

    /// Shared access to the surface, e.g. to type into the input.
    pub fn surface(&self) -> &Arc<Mutex<S>> {
        &self.surface
    }

    /// Send-button path.
    pub fn on_send_click(&self) -> Option<ReplyHandle> {
        self.submit()
    }

    /// Key handler for the input field. Enter submits, other keys do nothing.
    pub fn on_key(&self, key: Key) -> Option<ReplyHandle> {
        match key {
            Key::Enter => self.submit(),
            Key::Char(_) | Key::Other => None,
        }
    }

    /// Submit the input field's current value.
    ///
    /// Returns `None` without touching the surface when the trimmed input is
    /// empty. Otherwise the user and assistant nodes are appended and the
    /// input cleared before this returns; the reply streams in a spawned task.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self) -> Option<ReplyHandle> {
        let text = lock(&*self.surface).input_value();
        if text.trim().is_empty() {
            debug!("Ignoring empty submission");
            return None;
        }

        let node = {
            let mut surface = lock(&*self.surface);
            surface.append_message(Role::User, &text);
            let node = surface.append_message(Role::Assistant, "");
            surface.clear_input();
            node
        };

        let token = CancellationToken::new();
        let previous = lock(&self.active).replace(token.clone());
        if self.options.cancel_previous {
            if let Some(previous) = previous {
                previous.cancel();
            }
        }

        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let task = tokio::spawn(run_reply(
            Arc::clone(&self.surface),
            Arc::clone(&self.transport),
            Arc::clone(&self.options),
            text,
            node,
            token.clone(),
            state_tx,
        ));

        debug!(
            name: "chat.reply.spawned",
            node = node.index(),
            "Reply stream spawned"
        );

        Some(ReplyHandle {
            node,
            state: state_rx,
            token,
            task,
        })
    }

    /// Stream the reply to `message` into `node`, without error rendering.
    ///
    /// Resolves when the body ends. Errors are returned as-is; [`submit`]
    /// is the path that turns them into the error message.
    ///
    /// [`submit`]: Self::submit
    pub async fn stream_reply(&self, message: &str, node: NodeId) -> Result<()> {
        let (state, _) = watch::channel(StreamState::Idle);
        stream_into(&*self.surface, &*self.transport, message, node, &state).await
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_reply<S, T>(
    surface: Arc<Mutex<S>>,
    transport: Arc<T>,
    options: Arc<WidgetOptions>,
    prompt: String,
    node: NodeId,
    token: CancellationToken,
    state: watch::Sender<StreamState>,
) -> StreamState
where
    S: ChatSurface,
    T: ChatTransport + ?Sized,
{
    let result = tokio::select! {
        biased;
        () = token.cancelled() => Err(ChatError::Cancelled),
        res = stream_into(&*surface, &*transport, &prompt, node, &state) => res,
    };

    let outcome = match result {
        Ok(()) => StreamState::Completed,
        Err(ChatError::Cancelled) => {
            info!(name: "chat.reply.cancelled", node = node.index(), "Reply cancelled");
            StreamState::Cancelled
        }
        Err(err) => {
            error!(
                name: "chat.reply.failed",
                node = node.index(),
                error = %err,
                "Error fetching text stream"
            );
            lock(&*surface).set_text(node, &options.error_message);
            StreamState::Failed
        }
    };

    state.send_replace(outcome);
    debug!(node = node.index(), state = ?outcome, "Reply finished");
    outcome
}

async fn stream_into<S, T>(
    surface: &Mutex<S>,
    transport: &T,
    message: &str,
    node: NodeId,
    state: &watch::Sender<StreamState>,
) -> Result<()>
where
    S: ChatSurface,
    T: ChatTransport + ?Sized,
{
    state.send_replace(StreamState::RequestSent);
    debug!(node = node.index(), state = ?StreamState::RequestSent, "Chat request sent");
    let mut chunks = transport.open(message).await?;
    state.send_replace(StreamState::Streaming);
    debug!(node = node.index(), state = ?StreamState::Streaming, "Reply streaming");

    let mut decoder = Utf8StreamDecoder::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        let text = decoder.decode(&chunk);
        if !text.is_empty() {
            lock(surface).append_text(node, &text);
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        lock(surface).append_text(node, &tail);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ByteStream;
    use crate::surface::ChatLog;
    use bytes::Bytes;
    use futures::stream;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One scripted server behaviour.
    #[derive(Clone)]
    enum Script {
        Status(u16, &'static str),
        Chunks(Vec<Chunk>),
        /// Send one chunk, then never finish.
        Stall(&'static [u8]),
    }

    type Chunk = std::result::Result<&'static [u8], &'static str>;

    fn ok(bytes: &'static [u8]) -> Chunk {
        Ok(bytes)
    }

    fn fail(reason: &'static str) -> Chunk {
        Err(reason)
    }

    struct ScriptedTransport {
        script: Script,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(&self, prompt: &str) -> Result<ByteStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.script.clone() {
                Script::Status(status, text) => Err(ChatError::Request {
                    status,
                    status_text: text.to_string(),
                }),
                Script::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.into_iter().map(
                    |c| {
                        c.map(Bytes::from_static)
                            .map_err(|e| ChatError::StreamRead(e.to_string()))
                    },
                )))),
                Script::Stall(chunk) => Ok(Box::pin(
                    stream::once(async move { Ok::<_, ChatError>(Bytes::from_static(chunk)) })
                        .chain(stream::pending()),
                )),
            }
        }
    }

    fn scripted_widget(script: Script) -> (ChatWidget<ChatLog, ScriptedTransport>, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new(script);
        let widget = ChatWidget::new(
            ChatLog::new(),
            Arc::clone(&transport),
            WidgetOptions::default(),
        );
        (widget, transport)
    }

    fn type_input<T: ChatTransport + ?Sized + 'static>(widget: &ChatWidget<ChatLog, T>, text: &str) {
        widget.surface().lock().unwrap().set_input(text);
    }

    fn node_text<T: ChatTransport + ?Sized + 'static>(
        widget: &ChatWidget<ChatLog, T>,
        node: NodeId,
    ) -> String {
        widget
            .surface()
            .lock()
            .unwrap()
            .text(node)
            .unwrap_or_default()
            .to_string()
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    #[tokio::test]
    async fn test_submit_appends_nodes_before_network_resolves() {
        let (widget, transport) = scripted_widget(Script::Chunks(vec![ok(b"hi")]));
        type_input(&widget, "hello");

        let handle = widget.submit().unwrap();

        {
            let log = widget.surface().lock().unwrap();
            assert_eq!(log.len(), 2);
            assert_eq!(log.messages()[0].role, Role::User);
            assert_eq!(log.messages()[0].text, "hello");
            assert_eq!(log.messages()[1].role, Role::Assistant);
            assert_eq!(log.messages()[1].text, "");
            assert_eq!(log.input_value(), "");
        }
        assert_eq!(transport.calls(), 0);

        assert_eq!(handle.join().await, StreamState::Completed);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_input_is_a_no_op() {
        let (widget, transport) = scripted_widget(Script::Chunks(vec![]));

        for input in ["", "   ", "\n\t "] {
            type_input(&widget, input);
            assert!(widget.submit().is_none());
        }

        tokio::task::yield_now().await;
        assert!(widget.surface().lock().unwrap().is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_chunks_concatenate_into_assistant_node() {
        let (widget, transport) = scripted_widget(Script::Chunks(vec![
            ok(b"Hel"),
            ok(b"lo, "),
            ok(b"world!"),
        ]));
        type_input(&widget, "greet me");

        let handle = widget.submit().unwrap();
        let node = handle.node();
        assert_eq!(handle.join().await, StreamState::Completed);

        assert_eq!(node_text(&widget, node), "Hello, world!");
        assert_eq!(transport.prompts.lock().unwrap().as_slice(), ["greet me"]);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_chunks() {
        // "naïve €" with both non-ASCII characters split between chunks
        let (widget, _) = scripted_widget(Script::Chunks(vec![
            ok(b"na\xC3"),
            ok(b"\xAFve \xE2\x82"),
            ok(b"\xAC"),
        ]));
        type_input(&widget, "x");

        let handle = widget.submit().unwrap();
        let node = handle.node();
        handle.join().await;

        assert_eq!(node_text(&widget, node), "naïve €");
    }

    #[tokio::test]
    async fn test_non_ok_status_renders_error_and_logs() {
        let (logs, _guard) = capture_logs();
        let (widget, _) = scripted_widget(Script::Status(500, "Internal Server Error"));
        type_input(&widget, "hello");

        let handle = widget.submit().unwrap();
        let node = handle.node();
        assert_eq!(handle.join().await, StreamState::Failed);

        assert_eq!(node_text(&widget, node), DEFAULT_ERROR_MESSAGE);
        let output = logs.contents();
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("Internal Server Error"), "{output}");
    }

    #[tokio::test]
    async fn test_successful_reply_is_quiet_at_info_level() {
        let (logs, _guard) = capture_logs();
        let (widget, _) = scripted_widget(Script::Chunks(vec![ok(b"Hello")]));
        type_input(&widget, "hello");

        let handle = widget.submit().unwrap();
        assert_eq!(handle.join().await, StreamState::Completed);

        let output = logs.contents();
        assert!(output.is_empty(), "{output}");
    }

    #[tokio::test]
    async fn test_read_failure_discards_partial_text() {
        let (logs, _guard) = capture_logs();
        let (widget, _) = scripted_widget(Script::Chunks(vec![ok(b"Hel"), fail("connection reset")]));
        type_input(&widget, "hello");

        let handle = widget.submit().unwrap();
        let node = handle.node();
        assert_eq!(handle.join().await, StreamState::Failed);

        assert_eq!(node_text(&widget, node), DEFAULT_ERROR_MESSAGE);
        assert!(logs.contents().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_widget_stays_usable_after_failure() {
        let (widget, transport) = scripted_widget(Script::Status(503, "Service Unavailable"));

        type_input(&widget, "one");
        widget.submit().unwrap().join().await;
        type_input(&widget, "two");
        widget.submit().unwrap().join().await;

        assert_eq!(transport.calls(), 2);
        assert_eq!(widget.surface().lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_enter_key_matches_send_click() {
        let (widget, transport) = scripted_widget(Script::Chunks(vec![ok(b"ok")]));

        type_input(&widget, "via enter");
        assert!(widget.on_key(Key::Char('a')).is_none());
        assert!(widget.on_key(Key::Other).is_none());
        let by_key = widget.on_key(Key::Enter).unwrap();
        assert_eq!(by_key.join().await, StreamState::Completed);

        type_input(&widget, "via click");
        let by_click = widget.on_send_click().unwrap();
        assert_eq!(by_click.join().await, StreamState::Completed);

        let log = widget.surface().lock().unwrap();
        let texts: Vec<_> = log.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["via enter", "ok", "via click", "ok"]);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_replies_run_independently_by_default() {
        let (widget, _) = scripted_widget(Script::Stall(b"partial"));

        type_input(&widget, "first");
        let first = widget.submit().unwrap();
        type_input(&widget, "second");
        let second = widget.submit().unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(first.state(), StreamState::Streaming);
        assert_eq!(second.state(), StreamState::Streaming);
        assert_eq!(node_text(&widget, first.node()), "partial");
        assert_eq!(node_text(&widget, second.node()), "partial");

        first.cancel();
        second.cancel();
        assert_eq!(first.join().await, StreamState::Cancelled);
        assert_eq!(second.join().await, StreamState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_previous_stops_older_reply() {
        let transport = ScriptedTransport::new(Script::Stall(b"Hel"));
        let widget = ChatWidget::new(
            ChatLog::new(),
            Arc::clone(&transport),
            WidgetOptions {
                cancel_previous: true,
                ..WidgetOptions::default()
            },
        );

        type_input(&widget, "first");
        let first = widget.submit().unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(node_text(&widget, first.node()), "Hel");

        type_input(&widget, "second");
        let second = widget.submit().unwrap();

        let first_node = first.node();
        assert_eq!(first.join().await, StreamState::Cancelled);
        assert_eq!(node_text(&widget, first_node), "Hel");

        second.cancel();
        assert_eq!(second.join().await, StreamState::Cancelled);
    }

    #[tokio::test]
    async fn test_stream_reply_returns_errors_without_rendering() {
        let (widget, _) = scripted_widget(Script::Status(404, "Not Found"));
        let node = widget
            .surface()
            .lock()
            .unwrap()
            .append_message(Role::Assistant, "");

        let err = widget.stream_reply("hi", node).await.unwrap_err();
        assert!(matches!(err, ChatError::Request { status: 404, .. }));
        assert_eq!(node_text(&widget, node), "");
    }
}
