//! Backends speaking the Ollama HTTP API.

pub mod client;
pub mod config;
pub mod embedded;
pub mod handler;
mod stream;

pub use client::OllamaClient;
pub use config::OllamaConfig;
pub use embedded::EmbeddedServer;
pub use handler::HandlerAdaptor;

pub const HEARTBEAT_PATH: &str = "/";
pub const CHAT_PATH: &str = "/api/chat";
pub const SHOW_PATH: &str = "/api/show";
pub const LIST_PATH: &str = "/api/tags";
