//! `campus`: operator tooling for the school portal's access gate.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use client::ApiClient;
use commands::{config, fetch, health, route, token};
use output::{OutputFormat, Tone};

const DEFAULT_API_URL: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(
    name = "campus",
    version,
    about = "Inspect campus sessions, route rules and a running portal",
    propagate_version = true
)]
pub struct Cli {
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Portal base URL [falls back to `config set api-url`]
    #[arg(long, global = true, env = "CAMPUS_API_URL")]
    api_url: Option<String>,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint or verify session tokens offline
    #[command(subcommand)]
    Token(token::TokenCommands),

    /// Evaluate paths against the role route table
    #[command(subcommand)]
    Route(route::RouteCommands),

    /// GET a portal page with session cookies and show the gate's answer
    Fetch(fetch::FetchArgs),

    Health(health::HealthArgs),

    /// Read or change ~/.campus/config.toml
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

fn connect(api_url: Option<&str>) -> Result<ApiClient> {
    let url = match api_url {
        Some(url) => url.to_string(),
        None => config::load_value(config::ConfigKey::ApiUrl).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
    };
    ApiClient::new(&url)
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.output;
    match cli.command {
        Commands::Token(cmd) => token::execute(cmd, format),
        Commands::Route(cmd) => route::execute(cmd, format),
        Commands::Config(cmd) => config::execute(cmd, format),
        Commands::Fetch(args) => fetch::execute(args, &connect(cli.api_url.as_deref())?, format).await,
        Commands::Health(args) => health::execute(args, &connect(cli.api_url.as_deref())?, format).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        output::say(Tone::Fail, format!("{:#}", e));
        std::process::exit(1);
    }
}
