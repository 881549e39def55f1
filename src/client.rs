//! HTTP transport for the chat endpoint.

use std::pin::Pin;

use bytes::Bytes;
use clap::ValueEnum;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ChatError, Result};

/// Path of the streaming chat endpoint, relative to the origin.
pub const CHAT_ENDPOINT: &str = "/api/chat";

/// Query parameter carrying the user's message.
pub const PROMPT_PARAM: &str = "prompt";

/// Lazy, finite sequence of body chunks for one reply.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// How the prompt is written into the query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PromptEncoding {
    /// Insert the text verbatim. `&` and `#` in a message truncate the prompt.
    Raw,
    /// Form-encode the text so every character reaches the server.
    #[default]
    Percent,
}

impl PromptEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Percent => "percent",
        }
    }
}

/// Something that can open a reply stream for a prompt.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the prompt and return the response body as a chunk stream.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Request`] when the server answers with a
    /// non-success status. Chunk-level failures surface as
    /// [`ChatError::StreamRead`] items of the returned stream.
    async fn open(&self, prompt: &str) -> Result<ByteStream>;
}

/// reqwest-backed transport talking to `GET {origin}/api/chat`.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    origin: Url,
    http: reqwest::Client,
    encoding: PromptEncoding,
}

impl HttpChatClient {
    /// Create a client for the server at `origin` (e.g. `http://localhost:3000`).
    pub fn new(origin: impl AsRef<str>) -> Result<Self> {
        Self::with_client(origin, reqwest::Client::new())
    }

    /// Create a client with a custom reqwest client.
    pub fn with_client(origin: impl AsRef<str>, http: reqwest::Client) -> Result<Self> {
        let origin = Url::parse(origin.as_ref())?;
        Ok(Self {
            origin,
            http,
            encoding: PromptEncoding::default(),
        })
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: PromptEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Build the request URL for a prompt.
    pub fn chat_url(&self, prompt: &str) -> Result<Url> {
        match self.encoding {
            PromptEncoding::Percent => {
                let mut url = self.origin.join(CHAT_ENDPOINT)?;
                url.query_pairs_mut().append_pair(PROMPT_PARAM, prompt);
                Ok(url)
            }
            PromptEncoding::Raw => {
                let origin = self.origin.as_str().trim_end_matches('/');
                Ok(Url::parse(&format!(
                    "{origin}{CHAT_ENDPOINT}?{PROMPT_PARAM}={prompt}"
                ))?)
            }
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpChatClient {
    async fn open(&self, prompt: &str) -> Result<ByteStream> {
        let url = self.chat_url(prompt)?;
        debug!(name: "chat.request.sent", url = %url, "Opening reply stream");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Request {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::StreamRead(e.to_string())));
        Ok(Box::pin(chunks))
    }
}
