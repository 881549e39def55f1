//! Single inference worker.
//!
//! Generation runs one prompt at a time. Requests wait in a bounded queue;
//! each carries its own token channel, so a reply only ever reaches the
//! request that asked for it. Dropping the receiver abandons the generation.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::generate::Generator;

/// Fragments buffered between the worker and a slow client.
const TOKEN_BUFFER: usize = 32;

/// Why a prompt was not accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("inference queue is full")]
    Full,
    #[error("inference worker has stopped")]
    Closed,
}

struct Job {
    prompt: String,
    tokens: mpsc::Sender<anyhow::Result<String>>,
}

/// Sender side of the inference queue.
#[derive(Clone)]
pub struct InferenceQueue {
    jobs: mpsc::Sender<Job>,
    backend: &'static str,
}

impl std::fmt::Debug for InferenceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceQueue")
            .field("backend", &self.backend)
            .field("capacity", &self.jobs.capacity())
            .finish()
    }
}

impl InferenceQueue {
    /// Spawn the worker task. `depth` is the number of prompts that may wait.
    pub fn spawn(generator: Arc<dyn Generator>, depth: usize) -> Self {
        let (jobs, rx) = mpsc::channel(depth.max(1));
        let backend = generator.name();
        tokio::spawn(run_worker(generator, rx));
        Self { jobs, backend }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Queue a prompt and return the stream its reply will arrive on.
    pub fn submit(
        &self,
        prompt: String,
    ) -> Result<ReceiverStream<anyhow::Result<String>>, QueueError> {
        let (tokens, rx) = mpsc::channel(TOKEN_BUFFER);
        self.jobs
            .try_send(Job { prompt, tokens })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })?;
        Ok(ReceiverStream::new(rx))
    }
}

async fn run_worker(generator: Arc<dyn Generator>, mut jobs: mpsc::Receiver<Job>) {
    while let Some(job) = jobs.recv().await {
        if job.tokens.is_closed() {
            debug!(prompt_len = job.prompt.len(), "Client left before its turn, skipping");
            continue;
        }

        info!(
            name: "inference.started",
            backend = generator.name(),
            prompt_len = job.prompt.len(),
            "Inference started"
        );

        let mut sent = 0usize;
        match generator.generate(&job.prompt).await {
            Ok(mut stream) => loop {
                let next = tokio::select! {
                    () = job.tokens.closed() => None,
                    token = stream.next() => token,
                };
                let Some(token) = next else {
                    break;
                };
                let failed = token.is_err();
                if job.tokens.send(token).await.is_err() {
                    break;
                }
                sent += 1;
                if failed {
                    break;
                }
            },
            Err(e) => {
                warn!(error = %e, "Generator failed to start");
                let _ = job.tokens.send(Err(e)).await;
            }
        }

        if job.tokens.is_closed() {
            debug!(fragments = sent, "Client went away, generation abandoned");
        }
        info!(name: "inference.finished", fragments = sent, "Inference finished");
    }
}
