//! CLI commands for mazeswarm using clap.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::agent::{self, Endpoints};
use crate::config::{load_settings, Settings};
use crate::coordination::CoordinationServer;
use crate::launcher;
use crate::logging;
use crate::perception::{Maze, PerceptionServer, PerceptionService};
use crate::protocol::AgentId;

const SETTINGS_HELP: &str = "Only the positional arguments above are required. \
Ports and timings can optionally be overridden in ~/.mazeswarm/settings.json; \
without that file the built-in defaults are used.";

/// mazeswarm - cooperative maze exploration by a swarm of agents.
///
/// Positional arguments are the whole command-line surface; no flags are
/// needed. An optional `~/.mazeswarm/settings.json` may override ports and
/// timings, and built-in defaults apply when it is absent.
#[derive(Parser, Debug)]
#[command(name = "mazeswarm")]
#[command(version = "0.1.0")]
#[command(about = "Cooperative maze exploration: perception, coordination and agents", long_about = None)]
#[command(after_help = SETTINGS_HELP)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the perception service (UDP)
    Perception,

    /// Run the coordination service (TCP)
    Coordinator,

    /// Run one exploring agent
    Agent {
        /// Agent id
        #[arg(default_value_t = 1)]
        id: AgentId,

        /// Host of the perception service
        #[arg(default_value = "127.0.0.1")]
        perception_host: String,

        /// Host of the coordination service
        #[arg(default_value = "127.0.0.1")]
        coordination_host: String,
    },

    /// Start several agents as separate processes
    Launch {
        /// Number of agents; values below 1 start the default three
        #[arg(default_value_t = 3, allow_negative_numbers = true)]
        count: i64,
    },
}

impl Command {
    /// Log file used by the process running this command.
    pub fn log_file_name(&self) -> String {
        match self {
            Command::Perception => logging::file_name_for("perception", None),
            Command::Coordinator => logging::file_name_for("coordinator", None),
            Command::Agent { id, .. } => logging::file_name_for("agent", Some(*id)),
            Command::Launch { .. } => logging::file_name_for("launch", None),
        }
    }
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings = load_settings().context("Failed to load settings")?;

        match &self.command {
            Command::Perception => cmd_perception(&settings).await,
            Command::Coordinator => cmd_coordinator(&settings).await,
            Command::Agent {
                id,
                perception_host,
                coordination_host,
            } => cmd_agent(&settings, *id, perception_host, coordination_host).await,
            Command::Launch { count } => cmd_launch(*count),
        }
    }
}

// Command implementations

async fn cmd_perception(settings: &Settings) -> Result<()> {
    let maze = Maze::default_layout()?;
    let service = PerceptionService::new(maze);
    let server = PerceptionServer::bind(
        ("0.0.0.0", settings.perception.port),
        service,
        settings.perception.clone(),
        settings.render.enabled,
    )
    .await
    .with_context(|| format!("Failed to bind perception port {}", settings.perception.port))?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Perception service shutting down"),
    }
    Ok(())
}

async fn cmd_coordinator(settings: &Settings) -> Result<()> {
    let server = CoordinationServer::bind(
        ("0.0.0.0", settings.coordination.port),
        settings.coordination.clone(),
        settings.render.enabled,
    )
    .await
    .with_context(|| format!("Failed to bind coordination port {}", settings.coordination.port))?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Coordination service shutting down"),
    }
    Ok(())
}

async fn cmd_agent(
    settings: &Settings,
    id: AgentId,
    perception_host: &str,
    coordination_host: &str,
) -> Result<()> {
    let endpoints = Endpoints {
        perception: resolve(perception_host, settings.perception.port).await?,
        coordination: resolve(coordination_host, settings.coordination.port).await?,
    };

    tokio::select! {
        result = agent::run_agent(id, endpoints, &settings.agent) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Agent#{} interrupted", id),
    }
    Ok(())
}

fn cmd_launch(count: i64) -> Result<()> {
    let pids = launcher::launch_agents(count)?;
    println!("Started {} agents", pids.len());
    Ok(())
}

/// Resolve `host:port`, preferring an IPv4 address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Could not resolve {}", host))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No address found for {}", host))
}
