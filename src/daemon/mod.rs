//! Daemon module for FocusDot.
//!
//! This module contains the core daemon functionality:
//! - `clock`: wall clock, deadline wake and refresh ticker
//! - `timer`: timer engine with state transitions and countdown logic
//! - `broadcast`: snapshot fan-out to attached consumers
//! - `coordinator`: single-writer owner of the engine
//! - `ipc`: Unix socket message channel

pub mod broadcast;
pub mod clock;
pub mod coordinator;
pub mod ipc;
pub mod timer;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::config::{DaemonConfig, NotifierKind};
use crate::notification::{CommandNotifier, LogNotifier, Notifier};
use crate::storage::JsonFileStore;
use crate::sync::RestRemoteStore;

pub use broadcast::{BroadcastHub, ConsumerId, SnapshotCache};
pub use clock::{Clock, MockClock, MockWakeScheduler, SystemClock, Ticker, TokioWakeScheduler, WakeScheduler};
pub use coordinator::{Command, Coordinator, CoordinatorHandle, CoordinatorOptions, Subscription};
pub use ipc::{IpcError, IpcServer};
pub use timer::{TimerEngine, TimerEvent};

/// Runs the daemon until SIGINT or SIGTERM.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let socket_path = config.socket_path()?;
    let state_path = config.state_path()?;

    let store = JsonFileStore::new(&state_path);
    let remote = match &config.remote {
        Some(remote) => Some(Arc::new(
            RestRemoteStore::new(&remote.url, &remote.api_key, remote.request_timeout())
                .context("Failed to create remote store client")?,
        )),
        None => {
            info!("No remote store configured; running local-only");
            None
        }
    };
    let notifier: Arc<dyn Notifier> = match config.notifier {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Desktop => Arc::new(CommandNotifier::new()),
    };
    let options = CoordinatorOptions {
        tick_interval: config.tick_interval(),
        poll_interval: config.poll_interval(),
    };

    let server = IpcServer::new(&socket_path)?;
    let (coordinator, handle) =
        Coordinator::<RestRemoteStore>::new(Box::new(store), remote, notifier, Arc::new(SystemClock), options);
    let coordinator_task = tokio::spawn(coordinator.run());

    info!(
        "FocusDot daemon listening on {} (state {})",
        socket_path.display(),
        state_path.display()
    );

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = server.serve(handle.clone()) => {
            if let Err(e) = &result {
                error!("IPC server stopped: {:#}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
    }

    handle.shutdown();
    coordinator_task.await.context("Coordinator task panicked")?;
    info!("FocusDot daemon stopped");
    Ok(())
}
