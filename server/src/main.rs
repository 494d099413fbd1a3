//! "Jeux" game server: mediates player identity, pairwise invitations, and
//! turn-based tic-tac-toe play over a length-prefixed binary protocol.
//!
//! Usage: `jeux-server -p <port> [--bind <addr>] [--max-clients <n>] [-v...]`

use std::sync::Arc;

use clap::Parser;
use engine::GameEngine;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::dispatcher;
use server::invitation::GameFactory;
use server::server_state::ServerState;

/// Default cap on simultaneously-connected clients, matching spec.md §4.5.
const DEFAULT_MAX_CLIENTS: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "jeux-server", about = "Networked tic-tac-toe session server")]
struct Args {
    /// Port to listen on. The only flag spec.md itself requires.
    #[arg(short = 'p', long = "port")]
    port: u16,

    /// Address to bind the listening socket to.
    #[arg(long = "bind", default_value = "0.0.0.0")]
    bind: String,

    /// Maximum number of simultaneously-registered connections.
    #[arg(long = "max-clients", default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Increases log verbosity; may be repeated (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "jeux_server=info",
        1 => "jeux_server=debug",
        _ => "jeux_server=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();
}

fn tic_tac_toe_factory() -> GameFactory {
    Arc::new(|| Box::new(tic_tac_toe::Board::new()) as Box<dyn GameEngine>)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let server = Arc::new(ServerState::new(args.max_clients, tic_tac_toe_factory()));

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, %err, "failed to bind listening socket");
            std::process::exit(1);
        }
    };
    info!(%addr, "jeux server listening");

    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                };
                if let Err(err) = stream.set_nodelay(true) {
                    warn!(%err, "failed to set TCP_NODELAY");
                }
                match server.clients.register(Arc::new(stream), peer_addr) {
                    Ok(client) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            dispatcher::serve_connection(server, client).await;
                        });
                    }
                    Err(err) => {
                        warn!(%peer_addr, %err, "rejecting connection");
                    }
                }
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    terminate(&server).await;
}

/// Cleanly shuts the server down: half-close every live connection so each
/// service task observes EOF, runs its own logout/unregister path, and
/// exits on its own, then wait for the registry to drain before returning.
async fn terminate(server: &Arc<ServerState>) {
    server.clients.shutdown_all();
    debug!("waiting for service tasks to terminate...");
    server.clients.wait_for_empty().await;
    debug!("all service tasks terminated");
    info!("jeux server terminating");
}
