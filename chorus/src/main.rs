//! The chorus node process.
//!
//! Wires the catalog, the player, and a radio into the protocol loop, and
//! exposes the two process-level signals: start (running the binary) and
//! stop (Enter on stdin, standing in for the stop button on the box).

use anyhow::Context;
use chorus_link::{CancelToken, LogStatus, Node, SystemClock, Timings};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

mod config;
mod ident;

#[derive(Parser, Debug)]
#[clap(name = "chorus", version)]
#[clap(about = "One box of a self-organising singing fleet")]
struct Args {
    /// Directory of song folders, one stem file per track. Must be
    /// identical on every box.
    #[clap(long, default_value = "tracks")]
    catalog: PathBuf,

    /// Node identifier as 12 hex digits. Defaults to the NIC MAC.
    #[clap(long)]
    id: Option<String>,

    /// Local address for the bench radio.
    #[clap(long, default_value = "0.0.0.0:3917")]
    bind: SocketAddr,

    /// The broadcast address the whole fleet shares.
    #[clap(long, default_value = "255.255.255.255:3917")]
    channel: SocketAddr,

    /// Optional TOML file overriding protocol timings.
    #[clap(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("CHORUS_LOG")
        .init();

    let args = Args::parse();

    let mut timings = Timings::default();
    if let Some(path) = &args.config {
        config::load(path)?.apply(&mut timings);
    }

    let id = match &args.id {
        Some(text) => ident::parse(text)?,
        None => ident::detect(),
    };
    log::info!("node id {id}");

    let catalog =
        chorus_audio::Catalog::open(&args.catalog).context("cannot run without a catalog")?;
    let player = chorus_audio::StemPlayer::new(catalog);
    let radio =
        chorus_udp::UdpRadio::open(args.bind, args.channel).context("opening the bench radio")?;

    let cancel = CancelToken::new();
    watch_stdin(cancel.clone());
    log::info!("press Enter to stop");

    let mut node = Node::new(id, timings, cancel, radio, SystemClock, player, LogStatus);
    node.run().context("protocol loop failed")
}

/// Arms the cancel token from stdin: one line (or EOF) stops the loop.
fn watch_stdin(cancel: CancelToken) {
    std::thread::Builder::new()
        .name("chorus-stdin".into())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            log::info!("stop requested");
            cancel.cancel();
        })
        .expect("spawning the stdin watcher");
}
