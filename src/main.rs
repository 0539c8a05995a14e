//! Wiring: CLI parse, logging init, CAN adapter selection, event loop run,
//! graceful shutdown. Grounded on both teacher `main.rs` files'
//! `#[tokio::main]` + `tracing_subscriber::fmt()` init pattern
//! (`backend-rust/src/main.rs`, `packages/uwb-simulator/src/main.rs`).

mod aog_codec;
mod aog_udp;
mod can_stack;
mod cli;
mod client_state;
mod client_store;
mod ddi;
mod ddop;
mod error;
mod event_loop;
mod section_state;
mod subnet;
mod tc_server;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use can_stack::{CanStack, LoopbackCanStack};
use cli::{Args, CanAdapter};
use event_loop::EventLoop;
use subnet::SubnetStore;
use tc_server::TcServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!(?args.can_adapter, can_channel = args.can_channel, "starting AOG Task Controller");

    let mut can_stack = resolve_can_stack(args.can_adapter, args.can_channel)?;

    let subnet_store = SubnetStore::load();
    let subnet = subnet_store.current();
    let udp = aog_udp::AogUdp::bind(subnet, !args.skip_checksum_validation)
        .await
        .context("failed to bind AOG UDP sockets")?;

    let tc = TcServer::new();
    let mut event_loop = EventLoop::new(udp, subnet_store, tc);

    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            _ = event_loop.tick(can_stack.as_mut()) => {}
        }
    }

    can_stack.terminate();
    info!("AOG Task Controller stopped");
    Ok(())
}

/// Selects the CAN stack backend named on the CLI. None of the four named
/// vendor adapters have a driver wired into this crate (no vendor crate
/// fabricated — DESIGN.md), so every selection currently resolves to
/// `LoopbackCanStack`; a named, unreachable adapter logs a warning instead
/// of the §7 "Fatal: CAN hardware interface fails to start" exit this
/// function will perform once a real backend exists.
fn resolve_can_stack(adapter: CanAdapter, channel: u8) -> anyhow::Result<Box<dyn CanStack>> {
    match adapter {
        CanAdapter::Loopback => Ok(Box::new(LoopbackCanStack::new())),
        named => {
            warn!(
                ?named,
                channel,
                "no vendor driver wired in for this adapter, falling back to the loopback CAN stack"
            );
            Ok(Box::new(LoopbackCanStack::new()))
        }
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level.as_filter()));

    if args.log_to_file {
        let dirs = directories::ProjectDirs::from("", "", "AOG-TaskController")
            .context("could not resolve per-user application data directory")?;
        std::fs::create_dir_all(dirs.data_dir())?;
        let log_path = dirs.data_dir().join("aog-task-controller.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open log file at {}", log_path.display()))?;
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(file).with_ansi(false).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
