//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM or SIGINT (Ctrl-C elsewhere)
//! - Translate the first one into a graceful shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Registration failures are returned, not ignored: without them the
//!   process could only be stopped by force

use std::io;

/// Resolve when the process is asked to terminate.
#[cfg(unix)]
pub async fn wait_for_termination() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };
    Ok(name)
}

/// Resolve when the process is asked to terminate.
#[cfg(not(unix))]
pub async fn wait_for_termination() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
