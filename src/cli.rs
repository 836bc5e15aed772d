use crate::config::ConfigError;
use crate::domain::types::{ServerTransport, ToolServerDefinition};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "astrolabe",
    version,
    about = "Terminal agent for Ollama-backed models with MCP tool servers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive chat session (the default when no command is given)
    Chat,
    /// Ask one question and print the answer
    Query(QueryArgs),
    /// List models installed on the backend
    Models,
    /// Show configuration, backend reachability, and tool servers
    Status,
    /// Manage tool servers
    Server(ServerArgs),
    /// Show or change settings
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Prompt text; piped stdin is used when omitted
    pub prompt: Vec<String>,
    /// Read file content as context for the prompt
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
    /// Use this model instead of the configured default
    #[arg(long)]
    pub model: Option<String>,
    /// Print token and timing statistics after the answer
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[command(subcommand)]
    pub action: ServerAction,
}

#[derive(Subcommand, Debug)]
pub enum ServerAction {
    /// List configured servers and their discovered tools
    List,
    /// Add a server and rebuild the tool catalog
    Add(ServerAddArgs),
    /// Remove a server and rebuild the tool catalog
    Remove {
        /// Registry name of the server (case-insensitive)
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct ServerAddArgs {
    /// Registry name for the server
    pub name: String,
    /// Command to spawn for a stdio server
    #[arg(long, conflicts_with = "endpoint", required_unless_present = "endpoint")]
    pub cmd: Option<String>,
    /// Argument appended to the stdio command (repeatable)
    #[arg(long = "arg", requires = "cmd")]
    pub args: Vec<String>,
    /// KEY=VALUE environment entry for the stdio command; a $NAME value is
    /// resolved from this process's environment at connect time (repeatable)
    #[arg(long = "env", value_parser = parse_env_entry, requires = "cmd")]
    pub env: Vec<(String, String)>,
    /// Endpoint URL for a streamable HTTP server
    #[arg(long, conflicts_with = "cmd", required_unless_present = "cmd")]
    pub endpoint: Option<String>,
    /// NAME:VALUE header sent on every request to the endpoint (repeatable)
    #[arg(long = "header", value_parser = parse_header_entry, requires = "endpoint")]
    pub headers: Vec<(String, String)>,
}

impl ServerAddArgs {
    pub fn into_definition(self) -> ToolServerDefinition {
        let transport = match self.cmd {
            Some(command) => ServerTransport::Stdio {
                command,
                args: self.args,
                env: self.env.into_iter().collect(),
            },
            None => ServerTransport::Http {
                endpoint: self.endpoint.unwrap_or_default(),
                headers: self.headers.into_iter().collect(),
            },
        };
        ToolServerDefinition::new(self.name, transport)
    }
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Set the backend base URL
    #[arg(long)]
    pub base_url: Option<String>,
    /// Set the default model
    #[arg(long)]
    pub model: Option<String>,
    /// Set the context window size sent to the backend as num_ctx
    #[arg(long)]
    pub context: Option<u32>,
    /// Enable or disable model thinking (true/false)
    #[arg(long)]
    pub think: Option<bool>,
}

impl ConfigArgs {
    pub fn is_show(&self) -> bool {
        self.base_url.is_none()
            && self.model.is_none()
            && self.context.is_none()
            && self.think.is_none()
    }
}

fn parse_env_entry(raw: &str) -> Result<(String, String), ConfigError> {
    split_entry(raw, '=', "environment entry", "KEY=VALUE")
}

fn parse_header_entry(raw: &str) -> Result<(String, String), ConfigError> {
    split_entry(raw, ':', "header entry", "NAME:VALUE")
}

fn split_entry(
    raw: &str,
    separator: char,
    what: &'static str,
    expected: &'static str,
) -> Result<(String, String), ConfigError> {
    match raw.split_once(separator) {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::MalformedEntry {
            what,
            entry: raw.to_string(),
            expected,
        }),
    }
}
