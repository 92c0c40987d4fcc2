//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::Mutex;

use craftmon_history::{
    CpuRow, CsvHistory, EntityDeathRow, HistoryRow, MemoryRow, PlayerEventRow,
};

use crate::monitor::Snapshot;
use crate::poll_loop::DaemonState;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
/// No pass has completed yet.
const NOT_READY: i64 = -32002;

const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// A JSON-RPC error object.
#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Run the UDS JSON-RPC server.
pub async fn run_server(socket_path: &str, state: Arc<Mutex<DaemonState>>) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    state: Arc<Mutex<DaemonState>>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let params = &request["params"];
    let id = request["id"].clone();

    let outcome = match method {
        "stats" | "players" | "server_status" => {
            let st = state.lock().await;
            match st.snapshot.as_ref() {
                Some(snapshot) => build_view(method, snapshot),
                None => Err(RpcError::new(NOT_READY, "no monitor pass has completed yet")),
            }
        }
        "history" => {
            let history = state.lock().await.monitor.history().clone();
            let dataset = params["dataset"].as_str().unwrap_or("").to_owned();
            let limit = params["limit"]
                .as_u64()
                .map_or(DEFAULT_HISTORY_LIMIT, |n| n as usize);
            if dataset == "playtime" {
                let st = state.lock().await;
                serde_json::to_value(st.monitor.playtime().records())
                    .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
            } else {
                tokio::task::spawn_blocking(move || read_history(&history, &dataset, limit))
                    .await?
            }
        }
        _ => Err(RpcError::new(METHOD_NOT_FOUND, "method not found")),
    };

    let response = match outcome {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(error) => serde_json::json!({
            "jsonrpc": "2.0",
            "error": {"code": error.code, "message": error.message},
            "id": id,
        }),
    };
    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

/// The part of the snapshot a read method exposes.
fn build_view(method: &str, snapshot: &Snapshot) -> Result<serde_json::Value, RpcError> {
    let value = match method {
        "stats" => serde_json::json!({
            "memory": snapshot.memory,
            "cpu": snapshot.cpu,
            "taken_at": snapshot.taken_at,
        }),
        "players" => serde_json::to_value(&snapshot.players)
            .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?,
        "server_status" => serde_json::to_value(&snapshot.server_status)
            .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?,
        _ => return Err(RpcError::new(METHOD_NOT_FOUND, "method not found")),
    };
    Ok(value)
}

fn read_history(
    history: &CsvHistory,
    dataset: &str,
    limit: usize,
) -> Result<serde_json::Value, RpcError> {
    fn rows<R: HistoryRow + serde::Serialize>(
        history: &CsvHistory,
        limit: usize,
    ) -> Result<serde_json::Value, RpcError> {
        let rows: Vec<R> = history
            .recent(limit)
            .map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?;
        serde_json::to_value(rows).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
    }

    match dataset {
        CpuRow::DATASET => rows::<CpuRow>(history, limit),
        MemoryRow::DATASET => rows::<MemoryRow>(history, limit),
        PlayerEventRow::DATASET => rows::<PlayerEventRow>(history, limit),
        EntityDeathRow::DATASET => rows::<EntityDeathRow>(history, limit),
        other => Err(RpcError::new(
            INVALID_PARAMS,
            format!("unknown dataset {other:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rpc_call;
    use crate::monitor::Monitor;
    use crate::monitor::tests::{append_log, config};
    use crate::poll_loop::poll_tick;
    use craftmon_core::{FixedProbe, ProbeOutcome};

    async fn start(dir: &std::path::Path, with_pass: bool) -> String {
        let monitor = Monitor::new(&config(dir), Box::new(FixedProbe(ProbeOutcome::Running)));
        let state = Arc::new(Mutex::new(DaemonState::new(monitor)));
        if with_pass {
            poll_tick(&state).await.expect("test");
        }
        let socket = dir.join("run").join("craftmond.sock");
        let socket = socket.to_string_lossy().into_owned();
        let server_socket = socket.clone();
        tokio::spawn(async move {
            let _ = run_server(&server_socket, state).await;
        });
        for _ in 0..100 {
            if tokio::net::UnixStream::connect(&socket).await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        socket
    }

    #[tokio::test]
    async fn serves_snapshot_views() {
        let dir = tempfile::tempdir().expect("test");
        append_log(
            dir.path(),
            &[
                "[13Nov2025 22:00:00.000] [Server thread/INFO] [x/]: Done (9.1s)!",
                "[13Nov2025 22:01:00.000] [Server thread/INFO] [x/]: Alice joined the game",
                "[13Nov2025 22:02:00.000] [Server thread/INFO] [x/]: Named entity Wolf['Rex'/7, l='ServerLevel[world]', x=1.5, y=70.0, z=-2.0] died: Rex was slain by Skeleton",
            ],
        );
        let socket = start(dir.path(), true).await;

        let players = rpc_call(&socket, "players", serde_json::json!({})).await.expect("test");
        assert_eq!(players["online_count"], 1);
        assert_eq!(players["list"][0]["name"], "Alice");

        let status = rpc_call(&socket, "server_status", serde_json::json!({}))
            .await
            .expect("test");
        assert_eq!(status["status"], "ready");

        let stats = rpc_call(&socket, "stats", serde_json::json!({})).await.expect("test");
        assert_eq!(stats["memory"]["usage_percent"], 70.0);
        assert_eq!(stats["cpu"]["core_count"], 2);

        let history = rpc_call(
            &socket,
            "history",
            serde_json::json!({"dataset": "player_sessions", "limit": 5}),
        )
        .await
        .expect("test");
        assert_eq!(history[0]["event_type"], "join");
        assert_eq!(history[0]["player_name"], "Alice");

        let deaths = rpc_call(
            &socket,
            "history",
            serde_json::json!({"dataset": "entity_deaths"}),
        )
        .await
        .expect("test");
        assert_eq!(deaths[0]["entity_name"], "Rex");
        assert_eq!(deaths[0]["killer"], "Skeleton");
    }

    #[tokio::test]
    async fn errors_are_reported() {
        let dir = tempfile::tempdir().expect("test");
        let socket = start(dir.path(), false).await;

        let err = rpc_call(&socket, "players", serde_json::json!({}))
            .await
            .expect_err("not ready");
        assert!(err.to_string().contains("-32002"));

        let err = rpc_call(&socket, "list_panes", serde_json::json!({}))
            .await
            .expect_err("unknown method");
        assert!(err.to_string().contains("method not found"));

        let err = rpc_call(&socket, "history", serde_json::json!({"dataset": "weather"}))
            .await
            .expect_err("unknown dataset");
        assert!(err.to_string().contains("unknown dataset"));
    }

    #[test]
    fn stats_view_keeps_missing_readings_null() {
        let snapshot = Snapshot {
            memory: None,
            cpu: None,
            players: crate::monitor::PlayersView {
                online_count: 0,
                total_count: 0,
                list: Vec::new(),
            },
            server_status: craftmon_core::types::ServerStatus::new(
                craftmon_core::types::ServerState::Unknown,
                "Log file not found",
            ),
            taken_at: chrono::Utc::now(),
        };
        let view = build_view("stats", &snapshot).expect("test");
        assert!(view["memory"].is_null());
        assert!(view["cpu"].is_null());
    }
}
