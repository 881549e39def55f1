//! Streaming LLM chat UI
//!
//! A chat widget that sends the user's text to `GET /api/chat?prompt=...`
//! and renders the plain-text reply as it streams in, plus the server that
//! answers that endpoint.
//!
//! # Architecture
//!
//! - **Widget**: explicit [`widget::ChatWidget`] object over a surface and a transport
//! - **Transport**: reqwest client reading the body as a chunk stream
//! - **Server**: Axum router streaming generator output through a single inference worker
//!
//! # Modules
//!
//! - [`widget`]: submission flow and the per-reply read loop
//! - [`surface`]: chat log model the widget renders into
//! - [`decoder`]: incremental UTF-8 decoding across chunk boundaries
//! - [`client`]: HTTP transport for the chat endpoint
//! - [`generate`]: text generation backends
//! - [`server`]: HTTP routes and the inference worker
//! - [`terminal`]: terminal front end

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::unused_async)]

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod generate;
pub mod server;
pub mod surface;
pub mod terminal;
pub mod widget;

pub use client::{ChatTransport, HttpChatClient, PromptEncoding};
pub use error::ChatError;
pub use surface::{ChatLog, ChatSurface, NodeId, Role};
pub use widget::{ChatWidget, Key, ReplyHandle, StreamState, WidgetOptions};
