//! promptd - prompt chain generation daemon

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use promptd::metadata::read_metadata;
use promptd::prompt::{
    compile_with_overrides, compile_with_variables, ModuleOverrides, PromptChain,
};
use promptd::{Config, Server};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prompt chain compiler and benchmark generation daemon
#[derive(Parser, Debug)]
#[command(name = "promptd", version, about)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and generation queue
    Serve {
        /// Override the configured listen address
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Config file (defaults to promptd.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print generation metadata embedded in a PNG
    Inspect { path: PathBuf },
    /// Compile a prompt chain from a JSON file
    Compile {
        chain: PathBuf,

        /// Subject placed between pre and post modules
        #[arg(short, long)]
        subject: Option<String>,

        /// Placeholder value, as name=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got `{}`", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptd=info,tower_http=debug".into()),
        )
        .with(args.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.json).then(tracing_subscriber::fmt::layer))
        .init();

    match args.command {
        Command::Serve { bind, config } => serve(bind, config).await,
        Command::Inspect { path } => inspect(path),
        Command::Compile {
            chain,
            subject,
            vars,
        } => compile(chain, subject, vars),
    }
}

async fn serve(bind: Option<SocketAddr>, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(addr) = bind {
        config.bind_addr = addr;
    }
    if config.api.api_key.is_none() {
        info!("No API key configured; queued tasks will fail until one is set");
    }

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let data =
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = read_metadata(&data);
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn compile(path: PathBuf, subject: Option<String>, vars: Vec<(String, String)>) -> Result<()> {
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let chain: PromptChain = serde_json::from_str(&text)
        .map_err(|e| anyhow!("Invalid chain {}: {}", path.display(), e))?;

    let subject = subject.unwrap_or_else(|| chain.subject.clone());
    let overrides = ModuleOverrides::new();
    let prompt = if vars.is_empty() {
        compile_with_overrides(&chain, &subject, &overrides)
    } else {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        compile_with_variables(&chain, &subject, &overrides, &vars)
    };

    println!("{}", prompt);
    if !chain.negative_prompt.is_empty() {
        println!("negative: {}", chain.negative_prompt);
    }
    Ok(())
}
