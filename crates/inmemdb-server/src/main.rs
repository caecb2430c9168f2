mod command;
mod resp;
mod server;

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;
use tracing::{info, warn, Level};

use inmemdb_common::config::Config;
use inmemdb_core::{snapshot, Database};

use crate::server::Server;

/// In-memory key/value store speaking a binary wire protocol over TCP.
#[derive(Debug, Parser)]
#[command(name = "inmemdb-server", version)]
struct Args {
    /// Port to listen on (overrides the configured port).
    #[arg(short = 'p', long)]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    Config::init().context("loading configuration")?;
    let config = Config::global();

    let host: IpAddr = config.server.host.parse().context("parsing bind host")?;
    let port = args.port.unwrap_or(config.server.port);
    let addr = SocketAddr::new(host, port);

    let snapshot_path = config.snapshot.path.clone();
    let mut db = Database::new();
    if snapshot_path.exists() {
        if let Err(e) = snapshot::load(&mut db, &snapshot_path) {
            warn!(
                error = %e,
                path = ?snapshot_path,
                "Snapshot load failed, keeping whatever loaded"
            );
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        "Starting inmemdb server"
    );

    let local = LocalSet::new();
    runtime.block_on(local.run_until(async move {
        let server = Server::bind(addr, config.server.max_clients, snapshot_path)
            .with_context(|| format!("binding {addr}"))?;
        let bound = server.local_addr().context("reading bound address")?;
        info!(addr = %bound, "Listening");
        server.serve(db).await.context("running server")
    }))?;

    info!("Goodbye");
    Ok(())
}
