//! OpenAI Chat Completions backend.
//!
//! Sends the prompt to `/v1/chat/completions` with `stream: true` and yields
//! each `delta.content` fragment from the SSE frames as plain text.

use futures::StreamExt;
use tracing::debug;

use super::{Generator, TokenStream};

/// Connection and model settings for the Chat Completions backend.
#[derive(Debug, Clone)]
pub struct ChatCompletionsSettings {
    /// Base URL for the API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Optional system message sent ahead of the prompt.
    pub system_prompt: Option<String>,
}

/// Generator for the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    http: reqwest::Client,
    settings: ChatCompletionsSettings,
}

impl std::fmt::Debug for ChatCompletionsGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsGenerator")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl ChatCompletionsGenerator {
    #[must_use]
    pub fn new(settings: ChatCompletionsSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.settings.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": messages,
        })
    }
}

#[async_trait::async_trait]
impl Generator for ChatCompletionsGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<TokenStream> {
        let url = format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let mut rb = self.http.post(&url).json(&self.request_body(prompt));
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?.error_for_status()?;
        debug!(url = %url, "Chat completions stream opened");
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut done = false;

            futures::pin_mut!(byte_stream);
            'frames: while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);

                while let Some((pos, sep_len)) = find_frame_boundary(&buf) {
                    let frame = buf.drain(..pos + sep_len).collect::<Vec<_>>();
                    let text = String::from_utf8_lossy(&frame[..pos]);

                    for data in frame_data(&text) {
                        if data == "[DONE]" {
                            done = true;
                            break 'frames;
                        }
                        if let Some(delta) = delta_text(data)? {
                            yield delta;
                        }
                    }
                }
            }

            // A final frame may end without a blank line.
            if !done && !buf.is_empty() {
                let text = String::from_utf8_lossy(&buf).into_owned();
                for data in frame_data(&text) {
                    if data == "[DONE]" {
                        break;
                    }
                    if let Some(delta) = delta_text(data)? {
                        yield delta;
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// Earliest SSE event boundary in the buffer as `(position, separator length)`.
///
/// Events end with a blank line, and lines may end in `\n`, `\r\n` or `\r`.
fn find_frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    for (i, &b) in buf.iter().enumerate() {
        match b {
            b'\n' if buf.get(i + 1) == Some(&b'\n') => return Some((i, 2)),
            b'\r' if buf[i + 1..].starts_with(b"\n\r\n") => return Some((i, 4)),
            b'\r' if buf.get(i + 1) == Some(&b'\r') => return Some((i, 2)),
            _ => {}
        }
    }
    None
}

/// `data:` payloads of one SSE frame.
fn frame_data(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| line.starts_with("data:"))
        .map(|line| line.trim_start_matches("data:").trim())
}

/// Assistant text carried by one chunk payload, if any.
fn delta_text(data: &str) -> anyhow::Result<Option<String>> {
    let v: serde_json::Value = serde_json::from_str(data)?;
    Ok(v["choices"][0]["delta"]
        .get("content")
        .and_then(|x| x.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string))
}
