//! Text generation backends for the chat endpoint.
//!
//! A [`Generator`] turns one prompt into a stream of text fragments. The
//! server forwards each fragment to the client as soon as it is produced.
//!
//! # Backends
//!
//! - [`EchoGenerator`]: streams the prompt back word by word
//! - [`ChatCompletionsGenerator`]: OpenAI-compatible `/v1/chat/completions`

pub mod chat_completions;
pub mod echo;

pub use chat_completions::{ChatCompletionsGenerator, ChatCompletionsSettings};
pub use echo::EchoGenerator;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use crate::config::{BackendConfig, BackendKind};

/// Fragments of generated text, in order.
pub type TokenStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Trait for streaming text generators.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Start generating a reply to `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached. Failures after the
    /// first fragment are reported as stream items.
    async fn generate(&self, prompt: &str) -> anyhow::Result<TokenStream>;
}

/// Build the generator selected by the backend configuration.
pub fn from_config(config: &BackendConfig) -> anyhow::Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.kind {
        BackendKind::Echo => Arc::new(EchoGenerator::new(Duration::from_millis(
            config.echo_delay_ms,
        ))),
        BackendKind::Openai => {
            let settings = config
                .chat_completions_settings()
                .map_err(anyhow::Error::msg)?;
            Arc::new(ChatCompletionsGenerator::new(settings))
        }
    };
    Ok(generator)
}
