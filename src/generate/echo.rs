use std::time::Duration;

use super::{Generator, TokenStream};

/// Streams the prompt back one word at a time.
///
/// Useful for running the page without a model and for exercising chunked
/// delivery end to end.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator {
    delay: Duration,
}

impl EchoGenerator {
    /// `delay` is slept before each word.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl Generator for EchoGenerator {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<TokenStream> {
        let words: Vec<String> = prompt.split_inclusive(' ').map(ToString::to_string).collect();
        let delay = self.delay;

        let out = async_stream::stream! {
            for word in words {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<_, anyhow::Error>(word);
            }
        };

        Ok(Box::pin(out))
    }
}
