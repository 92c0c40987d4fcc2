//! craftmon: Minecraft server monitor binary.
//! The daemon tails the server log, samples host counters and serves the
//! latest snapshot over a Unix socket; the other subcommands are clients.

use clap::Parser;

mod cli;
mod client;
mod config;
mod monitor;
mod poll_loop;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("CRAFTMON_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("craftmon daemon starting");
            poll_loop::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Check(opts) => {
            let config = config::MonitorConfig::from_opts(&opts);
            let probe = config.process_probe();
            let snapshot = tokio::task::spawn_blocking(move || {
                monitor::Monitor::new(&config, probe).pass()
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        cli::Command::Stats => client::cmd_stats(&socket_path).await?,
        cli::Command::Players => client::cmd_players(&socket_path).await?,
        cli::Command::Status => client::cmd_status(&socket_path).await?,
        cli::Command::History(opts) => {
            client::cmd_history(&socket_path, opts.dataset, opts.limit).await?;
        }
    }

    Ok(())
}
