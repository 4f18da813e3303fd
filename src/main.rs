use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use pcap::{Activated, Capture};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod capture;
mod config;
mod engine;
mod flow;
mod packet;
mod report;

use config::{CliArgs, Config};
use engine::{Engine, EngineConfig};
use report::{Mode, Reporter};

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();

    // Load config from file if provided, otherwise use defaults.
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(Path::new(config_path))?
    } else {
        Config::default()
    };

    // CLI args override config file.
    config.merge_cli(&cli);

    // Logging goes to stderr; stdout carries only measurement output.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let filter = capture::build_filter(config.filter.as_deref());

    // Flows terminating at the capture interface's own address are
    // suppressed unless asked for; when the address cannot be discovered
    // the suppression is silently dropped.
    let mut local_addr = None;
    let cap = if let Some(ref ifname) = config.interface {
        if !config.show_local {
            local_addr = capture::local_addr_of(ifname);
            if local_addr.is_none() {
                tracing::debug!("no local address for {ifname}; reporting local flows too");
            }
        }
        match capture::open_live(ifname, &filter) {
            Ok(cap) => cap,
            Err(e) => {
                println!("Couldn't open {ifname}: {e}");
                std::process::exit(1);
            }
        }
    } else if let Some(ref path) = config.read {
        match capture::open_offline(path, &filter) {
            Ok(cap) => cap,
            Err(e) => {
                println!("Couldn't open {path}: {e}");
                std::process::exit(1);
            }
        }
    } else {
        println!("must set --interface or --read");
        std::process::exit(1);
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::Relaxed);
    })?;

    let mode = if config.machine {
        Mode::Machine
    } else {
        Mode::Human
    };
    let reporter = Reporter::new(std::io::stdout(), mode);
    let mut engine = Engine::new(
        EngineConfig {
            tsval_max_age: config.tsval_max_age as f64,
            flow_max_idle: config.flow_max_idle as f64,
            sum_interval: config.sum_int as f64,
            max_flows: config.max_flows,
            time_to_run: config.seconds as f64,
            max_packets: config.count,
            local_addr,
        },
        reporter,
    );

    run(cap, &mut engine, &running)?;
    Ok(())
}

/// Drive the engine with packets until the source runs dry, a configured
/// limit is hit, or shutdown is requested.
fn run<W: Write>(
    mut cap: Capture<dyn Activated>,
    engine: &mut Engine<W>,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    while running.load(Ordering::Relaxed) {
        let (ts_sec, ts_nsec, wire_len, data) = match cap.next_packet() {
            Ok(pkt) => (
                pkt.header.ts.tv_sec as i64,
                (pkt.header.ts.tv_usec as i64 * 1000) as u32,
                pkt.header.len,
                pkt.data,
            ),
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                tracing::error!("capture error: {e}");
                break;
            }
        };

        engine.process_packet(data, ts_sec, ts_nsec, wire_len)?;

        if engine.limit_reached() {
            engine.finish()?;
            return Ok(());
        }
        engine.housekeep()?;
    }
    engine.finish()?;
    Ok(())
}
