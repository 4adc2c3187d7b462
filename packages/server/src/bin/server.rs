//! Business object exchange server.
//!
//! Relays every object received from a client to all connected clients.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin boex-server
//! cargo run --bin boex-server -- --host 127.0.0.1 --port 50000 --log-level debug
//! ```

use boex_server::{BroadcastServer, ServerConfig, signal::shutdown_signal};
use boex_shared::{
    logger::setup_logger,
    time::{format_now, format_orderable_now},
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "boex-server")]
#[command(about = "Business object exchange server with broadcast to all clients", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to. Derived from the host name when omitted.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Default log level, overridden by RUST_LOG
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = match ServerConfig::resolve(Some(args.host), args.port) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Starting server at port {} ({})",
        config.port,
        format_orderable_now()
    );

    let server = match BroadcastServer::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Press Ctrl+C to shutdown");

    server.run_until(shutdown_signal()).await;

    tracing::info!("Server shutdown complete at {}", format_now());
}
