#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use llm_chat_ui::PromptEncoding;
use llm_chat_ui::config::{
    AppConfig, BackendConfig, BackendKind, ServerConfig, WidgetConfig,
};
use tokio::net::TcpListener;

/// Config for in-process servers; nothing is read from env or disk.
pub fn test_config(queue_depth: usize) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            static_dir: "static".to_string(),
            queue_depth,
        },
        backend: BackendConfig {
            kind: BackendKind::Echo,
            echo_delay_ms: 0,
            base_url: None,
            model: None,
            api_key: None,
            system_prompt: None,
        },
        widget: WidgetConfig {
            origin: "http://127.0.0.1:0".to_string(),
            prompt_encoding: PromptEncoding::Percent,
            error_message: "Error fetching text stream.".to_string(),
            cancel_previous: false,
        },
    })
}

/// Serve `router` on an ephemeral port and return its origin.
pub async fn spawn_app(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
