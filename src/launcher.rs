//! Start a batch of agent processes from the current binary.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result};
use crate::protocol::AgentId;

/// Agent count used when the requested one is below 1.
pub const DEFAULT_AGENT_COUNT: u32 = 3;

pub fn agent_count(requested: i64) -> u32 {
    if requested < 1 {
        DEFAULT_AGENT_COUNT
    } else {
        u32::try_from(requested).unwrap_or(u32::MAX)
    }
}

/// Command-line arguments that start agent `id` against local services.
pub fn agent_args(id: AgentId) -> Vec<String> {
    vec!["agent".to_string(), id.to_string()]
}

fn spawn_agent(binary: &Path, id: AgentId) -> Result<Child> {
    Command::new(binary)
        .args(agent_args(id))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Launch(format!("Failed to start agent {}: {}", id, e)))
}

/// Spawn agents `1..=count` detached and return their process ids.
pub fn launch_agents(requested: i64) -> Result<Vec<u32>> {
    let count = agent_count(requested);
    let binary = std::env::current_exe()?;

    let mut pids = Vec::with_capacity(count as usize);
    for id in 1..=count {
        let child = spawn_agent(&binary, id)?;
        tracing::info!("Started agent {} (pid {})", id, child.id());
        pids.push(child.id());
    }

    tracing::info!("Launched {} agents from {}", count, binary.display());
    Ok(pids)
}
