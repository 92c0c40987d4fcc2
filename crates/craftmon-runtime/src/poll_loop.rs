//! Poll loop: runs a monitor pass on every tick and publishes the
//! snapshot for the UDS server.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::cli::DaemonOpts;
use crate::config::MonitorConfig;
use crate::monitor::{Monitor, Snapshot};
use crate::server;

/// Shared daemon state protected by a mutex. Every pass and every
/// request goes through this one lock.
pub struct DaemonState {
    pub monitor: Monitor,
    /// Result of the latest completed pass.
    pub snapshot: Option<Snapshot>,
}

impl DaemonState {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            snapshot: None,
        }
    }
}

/// Run the daemon: starts poll loop and UDS server, waits for shutdown signal.
pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = MonitorConfig::from_opts(&opts.monitor);
    tracing::info!(
        log_file = %config.tracker.log_file.display(),
        data_dir = %config.history.dir.display(),
        proc_root = %config.host.proc_root().display(),
        "monitor configured"
    );
    let probe = config.process_probe();

    // Construction restores session state from disk.
    let state = tokio::task::spawn_blocking(move || {
        let mut monitor = Monitor::new(&config, probe);
        monitor.record_startup(chrono::Utc::now());
        Arc::new(Mutex::new(DaemonState::new(monitor)))
    })
    .await?;

    // First pass before serving so clients never see an empty daemon.
    poll_tick(&state).await?;

    // Start UDS server
    let server_state = Arc::clone(&state);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Start poll loop
    let poll_state = Arc::clone(&state);
    let poll_ms = opts.poll_interval_ms;
    let poll_handle = tokio::spawn(async move {
        run_poll_loop(poll_state, poll_ms).await;
    });

    tokio::select! {
        result = shutdown_signal() => result?,
        _ = poll_handle => {
            tracing::warn!("poll loop exited unexpectedly");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}

async fn run_poll_loop(state: Arc<Mutex<DaemonState>>, poll_ms: u64) {
    let mut ticker = interval(Duration::from_millis(poll_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; that pass already ran.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(e) = poll_tick(&state).await {
            tracing::warn!("poll tick failed: {e}");
        }
    }
}

/// One monitor pass on the blocking pool, holding the state lock for its
/// whole duration.
pub(crate) async fn poll_tick(state: &Arc<Mutex<DaemonState>>) -> anyhow::Result<()> {
    let tick_start = std::time::Instant::now();
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let mut st = state.blocking_lock();
        let snapshot = st.monitor.pass();
        st.snapshot = Some(snapshot);
    })
    .await?;
    tracing::debug!(elapsed_ms = tick_start.elapsed().as_millis() as u64, "poll tick");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::{append_log, config};
    use craftmon_core::{FixedProbe, ProbeOutcome};

    #[tokio::test]
    async fn tick_publishes_snapshot() {
        let dir = tempfile::tempdir().expect("test");
        append_log(
            dir.path(),
            &["[13Nov2025 22:01:00.000] [Server thread/INFO] [x/]: Alice joined the game"],
        );
        let monitor = Monitor::new(
            &config(dir.path()),
            Box::new(FixedProbe(ProbeOutcome::Running)),
        );
        let state = Arc::new(Mutex::new(DaemonState::new(monitor)));

        poll_tick(&state).await.expect("test");
        let st = state.lock().await;
        let snap = st.snapshot.as_ref().expect("snapshot");
        assert_eq!(snap.players.online_count, 1);
    }
}
