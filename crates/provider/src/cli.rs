use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Connect to an already running server.
    Remote,
    /// Start `ollama serve` as a child process and connect to it.
    Embedded,
}

#[derive(Debug, Parser)]
#[command(
    name = "ollama-provider",
    version,
    about = "Serves Llm.Chat, Llm.Show and Llm.List actions from a local Ollama"
)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = Backend::Remote)]
    pub backend: Backend,

    /// Executable used by the embedded backend.
    #[arg(long)]
    pub ollama_bin: Option<String>,
}
