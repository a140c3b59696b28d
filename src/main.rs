//! CLI entry point.
//!
//! Wires configuration, the Session Controller, and the Control Server
//! together and blocks for the lifetime of the process (spec.md §6.4). With
//! the control server enabled, recording is driven entirely by commands
//! arriving over that channel. With `--no-control` and an `--output` path,
//! this binary drives a single all-streams recording itself until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use xdf_recorder::clock::SystemClock;
use xdf_recorder::config::Settings;
use xdf_recorder::control::ControlServer;
use xdf_recorder::controller::{ControllerConfig, Selection, SessionController};
use xdf_recorder::model::SessionState;
use xdf_recorder::source::mock::MockSource;
use xdf_recorder::worker::WorkerConfig;

#[derive(Parser)]
#[command(name = "xdf-recorder")]
#[command(about = "Multi-stream acquisition-to-XDF recorder with a TCP control plane")]
struct Cli {
    /// Output XDF file; equivalent to issuing a `filename` control command
    /// at startup. Still required: no `filename` default exists, matching
    /// `set_filename`'s own contract.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Control server bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Control server port.
    #[arg(long)]
    port: Option<u16>,

    /// Disable the control server entirely.
    #[arg(long)]
    no_control: bool,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = &cli.bind {
        settings.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if cli.no_control {
        settings.enable_remote_control = false;
    }
    settings.validate().context("validating configuration")?;
    info!(?settings, "configuration loaded");

    // No real Lab Streaming Layer transport is wired in here (out of scope,
    // spec.md §1); the mock source lets this binary demonstrate the pipeline
    // end to end. A real deployment substitutes a genuine `StreamSource`.
    let source = Arc::new(MockSource::new(Vec::new()));
    let controller = Arc::new(SessionController::new(
        source,
        Arc::new(SystemClock::new()),
        ControllerConfig {
            discovery_timeout_s: settings.discovery_timeout_s,
            stop_timeout_s: settings.stop_timeout_s,
            worker: WorkerConfig {
                buffer_seconds: settings.buffer_seconds,
                max_chunk_len: 0,
                pull_timeout_s: settings.pull_timeout_s,
                max_samples_per_pull: settings.max_samples_per_pull,
                clock_offset_interval_s: settings.clock_sync_interval_s,
            },
            ..ControllerConfig::default()
        },
    ));

    let output_given = cli.output.is_some();
    if let Some(output) = cli.output {
        controller
            .set_filename(output.to_str().context("output path is not valid UTF-8")?)
            .context("setting output filename")?;
    }

    // Keep the accept-loop/worker threads alive, owning the process's main
    // thread as a Ctrl-C wait, the way the pack's own threaded examples do
    // (e.g. FutureSDR's `rx_threaded` example registers a `ctrlc` handler
    // around a plain blocking receive loop rather than an async runtime).
    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    let _server = if settings.enable_remote_control {
        let server = ControlServer::spawn(&settings.bind_address, settings.port, Arc::clone(&controller))
            .context("starting control server")?;
        info!(addr = %server.local_addr(), "control server ready");
        Some(server)
    } else if output_given {
        // No control channel to drive the session from, but an output path
        // was given on the command line: record everything discoverable
        // until interrupted (spec.md §6.4 / SPEC_FULL.md §9).
        controller.update_streams().context("discovering streams")?;
        controller.select(Selection::All).context("selecting streams")?;
        controller.start().context("starting recording")?;
        info!("recording started without a control server; press Ctrl-C to stop");
        None
    } else {
        info!("control server disabled (--no-control) and no --output given; nothing to record");
        None
    };

    interrupt_rx.recv().context("waiting for Ctrl-C")?;
    info!("shutting down");
    if controller.status().state == SessionState::Recording {
        if let Err(err) = controller.stop() {
            warn!(error = %err, "failed to stop recording cleanly on shutdown");
        }
    }
    Ok(())
}
