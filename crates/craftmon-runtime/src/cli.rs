//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "craftmon", about = "Minecraft server monitor: players, host load, readiness")]
pub struct Cli {
    /// UDS socket path (default: /tmp/craftmon-$USER/craftmond.sock)
    #[arg(long, short = 's', global = true, env = "CRAFTMON_SOCKET")]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (monitor loop + UDS server)
    Daemon(DaemonOpts),
    /// Run one monitor pass locally and print the snapshot as JSON
    Check(MonitorOpts),
    /// Host CPU and memory usage
    Stats,
    /// Tracked players, most recently active first
    Players,
    /// Server readiness
    Status,
    /// Recorded history rows, newest first
    History(HistoryOpts),
}

#[derive(Args)]
pub struct DaemonOpts {
    /// Poll interval in milliseconds
    #[arg(long, default_value = "1000", env = "CRAFTMON_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    #[command(flatten)]
    pub monitor: MonitorOpts,
}

/// Inputs, outputs and thresholds of a monitor pass.
#[derive(Args, Clone, Debug)]
pub struct MonitorOpts {
    /// Server log to tail
    #[arg(long, default_value = "/minecraft/logs/latest.log", env = "CRAFTMON_LOG_FILE")]
    pub log_file: PathBuf,

    /// Directory for session state, history and playtime files
    #[arg(long, default_value = "/data", env = "CRAFTMON_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Preferred usercache.json
    #[arg(long, default_value = "/data/usercache.json", env = "CRAFTMON_USERCACHE")]
    pub usercache: PathBuf,

    /// usercache.json used when the preferred one is missing
    #[arg(
        long,
        default_value = "/minecraft/usercache.json",
        env = "CRAFTMON_USERCACHE_FALLBACK"
    )]
    pub usercache_fallback: PathBuf,

    /// Root of the host counter files (stat, meminfo, loadavg, cpuinfo)
    #[arg(long, default_value = "/proc", env = "CRAFTMON_PROC_ROOT")]
    pub proc_root: PathBuf,

    /// Minimum spacing of CPU/memory history rows in milliseconds
    #[arg(long, default_value = "5000", env = "CRAFTMON_HISTORY_INTERVAL_MS")]
    pub history_interval_ms: u64,

    /// Rows kept per history file
    #[arg(long, default_value = "10000", env = "CRAFTMON_HISTORY_MAX_ROWS")]
    pub history_max_rows: usize,

    /// Seconds a loaded usercache is trusted before re-reading
    #[arg(long, default_value = "300", env = "CRAFTMON_USERCACHE_MAX_AGE_SECS")]
    pub usercache_max_age_secs: u64,

    /// Youngest previous CPU reading usable for a delta, in milliseconds
    #[arg(long, default_value = "100", env = "CRAFTMON_CPU_WINDOW_MIN_MS")]
    pub cpu_window_min_ms: u64,

    /// Oldest previous CPU reading usable for a delta, in milliseconds
    #[arg(long, default_value = "5000", env = "CRAFTMON_CPU_WINDOW_MAX_MS")]
    pub cpu_window_max_ms: u64,

    /// Without a process probe, a log touched this recently means "running"
    #[arg(long, default_value = "60", env = "CRAFTMON_LIVENESS_WINDOW_SECS")]
    pub liveness_window_secs: u64,

    /// Trailing bytes of the log scanned for readiness markers
    #[arg(long, default_value = "10000000", env = "CRAFTMON_READINESS_WINDOW_BYTES")]
    pub readiness_window_bytes: u64,

    /// `pgrep -f` pattern of the server process (repeatable)
    #[arg(
        long = "process-pattern",
        default_values = ["forge.*server.jar", "run.sh", "java.*forge"],
        env = "CRAFTMON_PROCESS_PATTERNS",
        value_delimiter = ','
    )]
    pub process_patterns: Vec<String>,

    /// Do not run pgrep (server in another container); use log freshness
    #[arg(long, env = "CRAFTMON_SKIP_PROCESS_PROBE")]
    pub skip_process_probe: bool,
}

#[derive(Args)]
pub struct HistoryOpts {
    /// Which history to read
    #[arg(value_enum)]
    pub dataset: Dataset,

    /// Maximum rows to show
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Dataset {
    Cpu,
    Memory,
    Players,
    Deaths,
    Playtime,
}

impl Dataset {
    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu_stats",
            Self::Memory => "memory_stats",
            Self::Players => "player_sessions",
            Self::Deaths => "entity_deaths",
            Self::Playtime => "playtime",
        }
    }
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/craftmon/craftmond.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/craftmon-{user}/craftmond.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_defaults() {
        let cli = Cli::try_parse_from(["craftmon", "daemon"]).expect("test");
        let Command::Daemon(opts) = cli.command else {
            panic!("expected daemon");
        };
        assert_eq!(opts.poll_interval_ms, 1000);
        assert_eq!(opts.monitor.log_file, PathBuf::from("/minecraft/logs/latest.log"));
        assert_eq!(opts.monitor.history_max_rows, 10_000);
        assert_eq!(opts.monitor.process_patterns.len(), 3);
        assert!(!opts.monitor.skip_process_probe);
    }

    #[test]
    fn repeated_patterns_replace_defaults() {
        let cli = Cli::try_parse_from([
            "craftmon",
            "check",
            "--process-pattern",
            "paper.*jar",
            "--process-pattern",
            "java",
        ])
        .expect("test");
        let Command::Check(opts) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(opts.process_patterns, vec!["paper.*jar", "java"]);
    }

    #[test]
    fn history_dataset_names() {
        let cli = Cli::try_parse_from(["craftmon", "history", "players", "-n", "5"]).expect("test");
        let Command::History(opts) = cli.command else {
            panic!("expected history");
        };
        assert_eq!(opts.dataset.as_str(), "player_sessions");
        assert_eq!(opts.limit, 5);

        let cli = Cli::try_parse_from(["craftmon", "history", "deaths"]).expect("test");
        let Command::History(opts) = cli.command else {
            panic!("expected history");
        };
        assert_eq!(opts.dataset.as_str(), "entity_deaths");
    }

    #[test]
    fn socket_path_is_global() {
        let cli = Cli::try_parse_from(["craftmon", "status", "-s", "/tmp/x.sock"]).expect("test");
        assert_eq!(cli.socket_path.as_deref(), Some("/tmp/x.sock"));
    }
}
