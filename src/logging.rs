//! Logging setup for mazeswarm using tracing.

use std::path::PathBuf;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with a per-process file appender and stderr output.
///
/// `file_name` names the log file inside the log directory, e.g.
/// `coordinator.log` or `agent-2.log`, so processes started together do not
/// share a file.
pub fn init(file_name: &str) -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = get_log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mazeswarm=debug"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::info!("mazeswarm logging initialized");
    tracing::info!("Log file: {}", log_dir.join(file_name).display());

    Ok((guard, log_dir))
}

/// Log file name for a process role.
pub fn file_name_for(role: &str, agent_id: Option<u32>) -> String {
    match agent_id {
        Some(id) => format!("{}-{}.log", role, id),
        None => format!("{}.log", role),
    }
}

fn get_log_dir() -> Result<PathBuf> {
    let home = directories::ProjectDirs::from("com", "mazeswarm", "mazeswarm")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    Ok(home.data_dir().join("logs"))
}

/// Initialize logging for tests (console only, no file).
#[cfg(test)]
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    // several tests in one binary may call this
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
