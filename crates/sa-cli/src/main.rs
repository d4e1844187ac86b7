//! A thin collaborator shell proving the runtime's contracts (C1-C8) are
//! callable end to end from argv — not a product CLI. Real CLIs/TUIs/HTTP
//! APIs are external collaborator concerns; this binary exists only so
//! the workspace has one runnable entry point exercising the wiring in
//! `sa-runtime`.
//!
//! Grounded on `crates/gateway/src/cli/{mod,run}.rs` for the subcommand
//! shape and `src/main.rs` for the tracing-init-then-bootstrap sequence,
//! both trimmed down to the one `run` path this shell needs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sa_domain::agent::Agent;
use sa_domain::config::Config;
use sa_domain::permission::{PermissionAction, PermissionRule};
use sa_domain::session::Session;
use sa_runtime::Runtime;

#[derive(Debug, Parser)]
#[command(name = "sa-cli", version, about = "Runtime collaborator shell")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one agent turn against a fresh in-memory session and print the result.
    Run {
        /// The user message to send.
        message: String,
        /// Agent name to invoke (registered on the fly with an allow-all permission).
        #[arg(long, default_value = "assistant")]
        agent: String,
        /// Base system prompt for the agent.
        #[arg(long, default_value = "You are a helpful assistant.")]
        prompt: String,
        /// Session id to run against (created if absent).
        #[arg(long, default_value = "cli-session")]
        session: String,
        /// Config file path; falls back to defaults when absent.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the full `AgentResult` as JSON instead of just the response text.
        #[arg(long)]
        json: bool,
    },
    /// Print version information.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sa_cli=info,sa_runtime=info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("sa-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Run {
            message,
            agent,
            prompt,
            session,
            config,
            json,
        } => run(message, agent, prompt, session, config, json).await,
    }
}

async fn run(message: String, agent_name: String, prompt: String, session_id: String, config_path: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => sa_runtime::load_config(&path)?,
        None => Config::default(),
    };

    let agent = Agent {
        permission: vec![PermissionRule::new("*", PermissionAction::Allow)],
        prompt,
        ..Agent::new(&agent_name)
    };

    let runtime = Runtime::bootstrap(&config, std::env::current_dir()?, vec![agent])?;

    let now = chrono::Utc::now();
    let session = Session {
        id: session_id.clone(),
        slug: session_id.clone(),
        project_id: "sa-cli".into(),
        directory: std::env::current_dir()?.display().to_string(),
        title: "sa-cli session".into(),
        message_counter: 0,
        created: now,
        updated: now,
    };
    if runtime.sessions.get(&session_id).await?.is_none() {
        runtime.sessions.create(&session).await?;
    }

    let result = runtime.execute_agent(&agent_name, &session_id, &message).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if let Some(error) = &result.error {
        eprintln!("error: {error}");
        std::process::exit(1);
    } else {
        println!("{}", result.response);
    }

    Ok(())
}
