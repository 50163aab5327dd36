//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGTERM/SIGINT and SIGHUP
//! - Translate signals to shutdown or action table reload
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads the action table, not shutdown
//! - Non-unix targets only see Ctrl+C

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// What a received signal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Spawns the signal loop. Reload requests go to `reload`; the first
/// shutdown signal triggers `shutdown` and ends the loop.
pub fn spawn_signal_handler(shutdown: Arc<Shutdown>, reload: mpsc::UnboundedSender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match next_signal().await {
                SignalEvent::Reload => {
                    tracing::info!("Reload signal received");
                    let _ = reload.send(());
                }
                SignalEvent::Shutdown => {
                    tracing::info!("Shutdown signal received");
                    shutdown.trigger();
                    return;
                }
            }
        }
    })
}

#[cfg(unix)]
async fn next_signal() -> SignalEvent {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut hangup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hangup)) => (term, hangup),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install unix signal handlers, using Ctrl+C only");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        event = ctrl_c() => event,
        _ = term.recv() => SignalEvent::Shutdown,
        _ = hangup.recv() => SignalEvent::Reload,
    }
}

#[cfg(not(unix))]
async fn next_signal() -> SignalEvent {
    ctrl_c().await
}

async fn ctrl_c() -> SignalEvent {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    SignalEvent::Shutdown
}
