mod application;
mod cli;
mod config;
mod domain;
mod infrastructure;
mod tui;

pub use application::{agent, catalog, registry};
pub use domain::types;
pub use infrastructure::{model, transport};

use agent::{Agent, SYSTEM_PROMPT, TurnRequest};
use catalog::{ToolCatalog, ToolDispatcher};
use clap::Parser;
use cli::{Cli, Command, ConfigArgs, QueryArgs, ServerAction};
use config::Settings;
use model::{ModelProvider, OllamaBackend};
use registry::ServerRegistry;
use std::error::Error;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use types::Message;

#[tokio::main]
async fn main() {
    init_tracing();
    dotenvy::dotenv().ok();

    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let root = config::config_root()?;
    config::ensure_root(&root)?;
    let settings = Settings::load(&root)?;
    debug!(root = %root.display(), base_url = %settings.base_url, "configuration loaded");

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(&root, &settings).await,
        Command::Query(args) => run_query(&root, &settings, args).await,
        Command::Models => run_models(&settings).await,
        Command::Status => run_status(&root, &settings).await,
        Command::Server(server) => run_server(&root, server.action).await,
        Command::Config(args) => run_config(&root, settings, args),
    }
}

async fn run_chat(root: &Path, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let provider = Arc::new(OllamaBackend::new(settings.base_url.clone()));
    let models = provider
        .list_models()
        .await
        .map_err(|err| err.user_message())?;

    let registry = ServerRegistry::load(root)?;
    info!(servers = registry.len(), "building tool catalog");
    let tools: Arc<dyn ToolDispatcher> =
        Arc::new(ToolCatalog::build(registry.definitions()).await?);

    tui::run_session(provider, tools, settings, models).await?;
    Ok(())
}

async fn run_query(
    root: &Path,
    settings: &Settings,
    args: QueryArgs,
) -> Result<(), Box<dyn Error>> {
    let model = args
        .model
        .clone()
        .or_else(|| settings.default_model.clone())
        .ok_or("no model configured; run 'astrolabe config --model <name>' first")?;
    let prompt = load_prompt(&args)?;

    let provider = Arc::new(OllamaBackend::new(settings.base_url.clone()));
    let registry = ServerRegistry::load(root)?;
    let tools: Arc<dyn ToolDispatcher> =
        Arc::new(ToolCatalog::build(registry.definitions()).await?);

    let agent = Agent::new(provider, tools);
    let outcome = agent
        .run_turn(TurnRequest {
            model,
            think: settings.think,
            options: settings.backend_options(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
        })
        .await?;

    println!("{}", outcome.reply.content);
    if args.stats && !outcome.total_duration.is_zero() {
        let tokens_per_sec = outcome.eval_count as f64 / outcome.total_duration.as_secs_f64();
        println!(
            "\n✓ Generated {} tokens in {:.1?} ({tokens_per_sec:.1} tokens/sec)",
            outcome.eval_count, outcome.total_duration
        );
    }
    Ok(())
}

async fn run_models(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let provider = OllamaBackend::new(settings.base_url.clone());
    let models = provider
        .list_models()
        .await
        .map_err(|err| err.user_message())?;

    if models.is_empty() {
        println!("No models installed. Pull one with 'ollama pull <name>'.");
        return Ok(());
    }
    println!("Installed models:");
    for model in &models {
        let marker = if settings.default_model.as_deref() == Some(model.name.as_str()) {
            "*"
        } else {
            " "
        };
        let modified = model
            .modified_at
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{marker} {:<32} {:>9}  {modified}",
            model.name,
            model.size_display()
        );
    }
    Ok(())
}

async fn run_status(root: &Path, settings: &Settings) -> Result<(), Box<dyn Error>> {
    println!("Config root: {}", root.display());
    println!("Base URL:    {}", settings.base_url);
    println!(
        "Model:       {}",
        settings.default_model.as_deref().unwrap_or("(not set)")
    );
    println!("Think:       {}", settings.think);
    match settings.context_limit {
        Some(limit) => println!("Context:     {limit}"),
        None => println!("Context:     (backend default)"),
    }

    let provider = OllamaBackend::new(settings.base_url.clone());
    match provider.list_models().await {
        Ok(models) => println!("Backend:     reachable ({} models)", models.len()),
        Err(err) => println!("Backend:     unreachable ({})", err.user_message()),
    }

    let registry = ServerRegistry::load(root)?;
    if registry.is_empty() {
        println!("Servers:     none configured");
    } else {
        println!("Servers:");
        for definition in registry.definitions() {
            println!("  {} ({})", definition.name, definition.transport.describe());
        }
    }
    Ok(())
}

async fn run_server(root: &Path, action: ServerAction) -> Result<(), Box<dyn Error>> {
    let mut registry = ServerRegistry::load(root)?;

    match action {
        ServerAction::List => {
            if registry.is_empty() {
                println!("No tool servers configured. Add one with 'astrolabe server add'.");
                return Ok(());
            }
            for definition in registry.definitions() {
                println!("{} ({})", definition.name, definition.transport.describe());
                if definition.tools.is_empty() {
                    println!("  (no tools discovered yet)");
                }
                for tool in &definition.tools {
                    if tool.description.is_empty() {
                        println!("  {}", tool.name);
                    } else {
                        println!("  {} - {}", tool.name, tool.description);
                    }
                }
            }
        }
        ServerAction::Add(args) => {
            let definition = args.into_definition();
            let name = definition.name.clone();
            let candidate = registry.with_added(definition)?;
            info!(server = %name, "verifying new server before saving");
            let catalog = ToolCatalog::build(&candidate).await?;
            let tool_count = catalog.tool_count();
            registry.commit(root, catalog.into_definitions())?;
            println!("Added server '{name}' ({tool_count} tools available).");
        }
        ServerAction::Remove { name } => {
            let candidate = registry.with_removed(&name)?;
            let catalog = ToolCatalog::build(&candidate).await?;
            registry.commit(root, catalog.into_definitions())?;
            println!("Removed server '{name}'.");
        }
    }
    Ok(())
}

fn run_config(root: &Path, mut settings: Settings, args: ConfigArgs) -> Result<(), Box<dyn Error>> {
    if args.is_show() {
        let rendered = toml::to_string_pretty(&settings)?;
        print!("{rendered}");
        return Ok(());
    }

    if let Some(url) = &args.base_url {
        settings.set_base_url(url)?;
        println!("Base URL set to {}", settings.base_url);
    }
    if let Some(model) = args.model {
        let model = model.trim().to_string();
        if model.is_empty() {
            return Err("model name cannot be empty".into());
        }
        println!("Default model set to {model}");
        settings.default_model = Some(model);
    }
    if let Some(context) = args.context {
        settings.context_limit = Some(context);
        println!("Context window set to {context}");
    }
    if let Some(think) = args.think {
        settings.think = think;
        println!("Thinking {}", if think { "enabled" } else { "disabled" });
    }
    settings.save(root)?;
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}

/// Builds the one-shot prompt from arguments, an optional context file, or
/// piped stdin. File or piped content becomes fenced context above the query.
fn load_prompt(args: &QueryArgs) -> Result<String, Box<dyn Error>> {
    let typed = args.prompt.join(" ").trim().to_string();

    let mut context = None;
    if let Some(path) = &args.file {
        info!(path = %path.display(), "reading prompt context from file");
        context = Some(fs::read_to_string(path)?);
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        if !buffer.trim().is_empty() {
            info!("using piped stdin as prompt context");
            context = Some(buffer);
        }
    }

    match (typed.is_empty(), context) {
        (false, Some(context)) => Ok(format!(
            "```\n{}\n```\nUser Query: {typed}",
            context.trim_end()
        )),
        (false, None) => Ok(typed),
        (true, Some(context)) => Ok(context.trim().to_string()),
        (true, None) => {
            warn!("no prompt provided via arguments, file, or stdin");
            Err("prompt required via arguments, a file, or piped stdin".into())
        }
    }
}
