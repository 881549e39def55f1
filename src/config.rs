use crate::client::PromptEncoding;
use crate::widget::DEFAULT_ERROR_MESSAGE;
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Interface to bind
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT", global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the chat page and the streaming `/api/chat` endpoint
    Serve(ServeArgs),
    /// Chat with a running server from the terminal
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Text generation backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory holding the chat page
    #[arg(long)]
    pub static_dir: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChatArgs {
    /// Server origin, e.g. `http://127.0.0.1:3000`
    #[arg(long)]
    pub origin: Option<String>,

    /// How the prompt is written into the query string
    #[arg(long, value_enum)]
    pub prompt_encoding: Option<PromptEncoding>,

    /// Cancel the in-flight reply when a new message is sent
    #[arg(long)]
    pub cancel_previous: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub widget: WidgetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: String,
    /// Prompts waiting for the inference worker before new ones are refused.
    pub queue_depth: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Stream the prompt back word by word.
    Echo,
    /// Proxy an OpenAI-compatible `/v1/chat/completions` endpoint.
    Openai,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub echo_delay_ms: u64,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetConfig {
    pub origin: String,
    pub prompt_encoding: PromptEncoding,
    pub error_message: String,
    pub cancel_previous: bool,
}

impl AppConfig {
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Layer defaults, config file, environment and CLI flags, lowest priority first.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.static_dir", "static")?
            .set_default("server.queue_depth", 3)?
            .set_default("backend.kind", "echo")?
            .set_default("backend.echo_delay_ms", 40)?
            .set_default("widget.origin", "http://127.0.0.1:3000")?
            .set_default("widget.prompt_encoding", "percent")?
            .set_default("widget.error_message", DEFAULT_ERROR_MESSAGE)?
            .set_default("widget.cancel_previous", false)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. LLMUI_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("LLMUI")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Conventional names shared with other OpenAI-compatible tooling.
        if let Ok(val) = env::var("LLM_BASE_URL") {
            builder = builder.set_override("backend.base_url", val)?;
        }
        if let Ok(val) = env::var("LLM_MODEL") {
            builder = builder.set_override("backend.model", val)?;
        }
        if let Ok(val) = env::var("LLM_API_KEY") {
            if !val.trim().is_empty() {
                builder = builder.set_override("backend.api_key", val)?;
            }
        }

        // Serving is also the default without a subcommand.
        if let Some(host) = &cli.host {
            builder = builder.set_override("server.host", host.as_str())?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        match &cli.command {
            Some(Command::Serve(args)) => {
                if let Some(kind) = args.backend {
                    builder = builder.set_override("backend.kind", kind.as_str())?;
                }
                if let Some(dir) = &args.static_dir {
                    builder = builder.set_override("server.static_dir", dir.as_str())?;
                }
            }
            Some(Command::Chat(args)) => {
                if let Some(origin) = &args.origin {
                    builder = builder.set_override("widget.origin", origin.as_str())?;
                }
                if let Some(encoding) = args.prompt_encoding {
                    builder = builder.set_override("widget.prompt_encoding", encoding.as_str())?;
                }
                if let Some(cancel) = args.cancel_previous {
                    builder = builder.set_override("widget.cancel_previous", cancel)?;
                }
            }
            None => {}
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Openai => "openai",
        }
    }
}

impl BackendConfig {
    /// Settings for the OpenAI-compatible backend, failing on missing keys.
    pub fn chat_completions_settings(
        &self,
    ) -> Result<crate::generate::ChatCompletionsSettings, String> {
        let base_url = self
            .base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| "Missing required setting: backend.base_url (LLM_BASE_URL)".to_string())?;
        let model = self
            .model
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| "Missing required setting: backend.model (LLM_MODEL)".to_string())?;

        Ok(crate::generate::ChatCompletionsSettings {
            base_url,
            model,
            api_key: self.api_key.clone().filter(|s| !s.trim().is_empty()),
            system_prompt: self.system_prompt.clone(),
        })
    }
}
