//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::cli::Dataset;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `craftmon stats`
pub async fn cmd_stats(socket_path: &str) -> anyhow::Result<()> {
    let stats = rpc_call(socket_path, "stats", serde_json::json!({})).await?;
    println!("{}", format_stats(&stats));
    Ok(())
}

/// `craftmon players`
pub async fn cmd_players(socket_path: &str) -> anyhow::Result<()> {
    let players = rpc_call(socket_path, "players", serde_json::json!({})).await?;
    print!("{}", format_players(&players));
    Ok(())
}

/// `craftmon status`
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "server_status", serde_json::json!({})).await?;
    println!(
        "{}: {}",
        status["status"].as_str().unwrap_or("unknown"),
        status["message"].as_str().unwrap_or("")
    );
    Ok(())
}

/// `craftmon history <dataset>`: one JSON object per line.
pub async fn cmd_history(socket_path: &str, dataset: Dataset, limit: usize) -> anyhow::Result<()> {
    let params = serde_json::json!({"dataset": dataset.as_str(), "limit": limit});
    let rows = rpc_call(socket_path, "history", params).await?;
    for row in rows.as_array().into_iter().flatten().take(limit) {
        println!("{row}");
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    format!("{:.1} GiB", bytes as f64 / GIB)
}

/// Pure formatting logic for stats output, separated for testability.
pub(crate) fn format_stats(stats: &serde_json::Value) -> String {
    let cpu = match stats["cpu"].as_object() {
        Some(cpu) => format!(
            "cpu    {:>6.2}%  ({} cores, {})",
            cpu.get("percent").and_then(|v| v.as_f64()).unwrap_or(0.0),
            cpu.get("core_count").and_then(|v| v.as_u64()).unwrap_or(0),
            cpu.get("method").and_then(|v| v.as_str()).unwrap_or("?"),
        ),
        None => "cpu    unavailable".to_string(),
    };
    let memory = match stats["memory"].as_object() {
        Some(mem) => format!(
            "memory {:>6.2}%  ({} / {})",
            mem.get("usage_percent").and_then(|v| v.as_f64()).unwrap_or(0.0),
            format_bytes(mem.get("used").and_then(|v| v.as_u64()).unwrap_or(0)),
            format_bytes(mem.get("total").and_then(|v| v.as_u64()).unwrap_or(0)),
        ),
        None => "memory unavailable".to_string(),
    };
    format!("{cpu}\n{memory}")
}

/// One line per player: marker, name, last activity.
pub(crate) fn format_players(players: &serde_json::Value) -> String {
    let mut out = format!(
        "{} online / {} known\n",
        players["online_count"].as_u64().unwrap_or(0),
        players["total_count"].as_u64().unwrap_or(0)
    );
    for p in players["list"].as_array().into_iter().flatten() {
        let marker = if p["is_online"].as_bool().unwrap_or(false) { '*' } else { ' ' };
        out.push_str(&format!(
            "{marker} {:<16} {}\n",
            p["name"].as_str().unwrap_or("?"),
            p["last_activity"].as_str().unwrap_or("-"),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_stats_full() {
        let stats = serde_json::json!({
            "cpu": {"percent": 12.5, "core_count": 8, "method": "delta"},
            "memory": {"total": 8_589_934_592u64, "used": 4_294_967_296u64, "usage_percent": 50.0},
        });
        let out = format_stats(&stats);
        assert!(out.contains("12.50%"), "cpu percent");
        assert!(out.contains("8 cores, delta"));
        assert!(out.contains("4.0 GiB / 8.0 GiB"));
    }

    #[test]
    fn format_stats_missing_readings() {
        let stats = serde_json::json!({"cpu": null, "memory": null});
        let out = format_stats(&stats);
        assert!(out.contains("cpu    unavailable"));
        assert!(out.contains("memory unavailable"));
    }

    #[test]
    fn format_players_marks_online() {
        let players = serde_json::json!({
            "online_count": 1,
            "total_count": 2,
            "list": [
                {"name": "Alice", "is_online": true, "last_activity": "2025-11-13T22:00:00Z"},
                {"name": "Bob", "is_online": false, "last_activity": null},
            ],
        });
        let out = format_players(&players);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "1 online / 2 known");
        assert!(lines[1].starts_with("* Alice"));
        assert!(lines[2].starts_with("  Bob"));
        assert!(lines[2].ends_with('-'));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_an_error() {
        let dir = tempfile::tempdir().expect("test");
        let socket = dir.path().join("none.sock");
        let err = rpc_call(&socket.to_string_lossy(), "stats", serde_json::json!({}))
            .await
            .expect_err("no daemon");
        assert!(err.to_string().contains("cannot connect"));
    }
}
