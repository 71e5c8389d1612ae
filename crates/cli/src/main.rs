mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use runtime::tools::file_tools;
use runtime::{
    ChatOptions, Engine, PromptTable, ProviderRegistry, RunOptions, Sandbox, ToolRegistry,
    load_tool_table,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "switchboard.toml";

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Run prompt templates against interchangeable chat backends", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a prompt from the prompt table
    Run {
        /// Prompt name
        prompt: String,
        /// Request object as JSON
        #[arg(short, long)]
        request: Option<String>,
        /// Provider to use instead of the configured default
        #[arg(short, long)]
        provider: Option<String>,
        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List the prompt table
    Prompts,
    /// List registered tools
    Tools,
    /// List configured providers
    Providers,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    debug!(path = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Run {
            prompt,
            request,
            provider,
            model,
        } => cmd_run(config, &prompt, request.as_deref(), provider, model).await,
        Commands::Prompts => cmd_prompts(&config),
        Commands::Tools => cmd_tools(&config),
        Commands::Providers => {
            cmd_providers(&config);
            Ok(())
        }
    }
}

async fn cmd_run(
    config: Config,
    prompt: &str,
    request: Option<&str>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let request = parse_request(request)?;
    let providers = ProviderRegistry::from_configs(
        config.engine.default_provider.clone(),
        &config.providers,
        config.retry,
    )?;
    let tools = tool_registry(&config)?;
    let prompts = PromptTable::load(&config.engine.prompts)?;
    let engine = Engine::new(Arc::new(providers), Arc::new(tools), prompts)
        .with_config(config.engine);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    let overrides = ChatOptions {
        model,
        provider_name: provider,
        ..ChatOptions::default()
    };
    let options = RunOptions::new()
        .with_overrides(overrides)
        .with_cancel(cancel);

    let response = engine.execute_prompt(prompt, request, options).await?;
    println!("{:#}", response.to_json());
    Ok(())
}

fn cmd_prompts(config: &Config) -> Result<()> {
    let prompts = PromptTable::load(&config.engine.prompts)?;
    if prompts.is_empty() {
        println!("No prompts found.");
        return Ok(());
    }

    println!("{:<24}  REQUEST FORMAT", "PROMPT");
    println!("{}", "-".repeat(60));
    for (name, template) in prompts.iter() {
        let format = template
            .request_format
            .as_ref()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(field, ty)| format!("{field}: {ty}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!("{name:<24}  {format}");
    }
    Ok(())
}

fn cmd_tools(config: &Config) -> Result<()> {
    let tools = tool_registry(config)?;
    if tools.is_empty() {
        println!("No tools registered.");
        return Ok(());
    }

    println!("{:<24}  {:<8}  DESCRIPTION", "TOOL", "KIND");
    println!("{}", "-".repeat(80));
    for schema in tools.describe() {
        let kind = tools
            .get(&schema.name)
            .map(|tool| tool.kind().to_string())
            .unwrap_or_default();
        println!("{:<24}  {kind:<8}  {}", schema.name, schema.description);
    }
    Ok(())
}

fn cmd_providers(config: &Config) {
    println!("{:<20}  {:<18}  MODEL", "PROVIDER", "KIND");
    println!("{}", "-".repeat(70));
    for (name, provider) in &config.providers {
        let marker = if *name == config.engine.default_provider {
            "*"
        } else {
            " "
        };
        let model = provider.model.as_deref().unwrap_or("(default)");
        println!("{marker}{name:<19}  {:<18}  {model}", provider.kind);
    }
}

/// Native file tools (when enabled) plus the scripted tool table.
fn tool_registry(config: &Config) -> Result<ToolRegistry> {
    let registry = ToolRegistry::new(Sandbox::new(&config.policy));
    if config.file_tools {
        for (schema, body) in file_tools(Arc::new(config.policy.clone())) {
            registry.register(schema.name.clone(), schema, body)?;
        }
    }
    load_tool_table(&config.engine.tools, &registry)?;
    Ok(registry)
}

fn parse_request(request: Option<&str>) -> Result<Value> {
    let Some(text) = request else {
        return Ok(Value::Object(Default::default()));
    };
    match serde_json::from_str(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(Error::InvalidRequest("expected a JSON object".into())),
        Err(e) => Err(Error::InvalidRequest(e.to_string())),
    }
}
