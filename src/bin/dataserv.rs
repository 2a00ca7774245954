//! `dataserv` command-line interface
//!
//! Runs the data broker (`dataserv serve`) or queries a running one
//! (`dataserv list`).

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dataserv_rs::protocol::constants::{DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY};
use dataserv_rs::server::{Broker, ServerConfig};

#[derive(Parser)]
#[command(name = "dataserv", about = "Streaming data broker for laboratory experiment data")]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the broker until interrupted
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Capacity of each sink's queue
        #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
        queue_capacity: usize,

        /// Maximum concurrent connections (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_connections: usize,
    },

    /// List the datasets live on a running broker
    List {
        /// Broker host
        #[arg(long, default_value = "127.0.0.1")]
        addr: String,

        /// Broker port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dataserv_rs={default},dataserv={default}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve {
            port,
            bind,
            queue_capacity,
            max_connections,
        } => {
            let config = ServerConfig::default()
                .bind(SocketAddr::new(bind, port))
                .queue_capacity(queue_capacity)
                .max_connections(max_connections);

            let broker = match Broker::bind(config).await {
                Ok(broker) => broker,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to bind");
                    eprintln!("dataserv: failed to bind to {bind}:{port}: {e}");
                    return ExitCode::FAILURE;
                }
            };

            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    tracing::error!("Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };

            match broker.run_until(shutdown).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "Broker terminated with an error");
                    ExitCode::FAILURE
                }
            }
        }

        Command::List { addr, port } => {
            match dataserv_rs::client::fetch_datasets((addr.as_str(), port)).await {
                Ok(datasets) => {
                    for name in datasets {
                        println!("{name}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("dataserv: failed to query {addr}:{port}: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
