use string_tuner::catalog::{Catalog, Instrument};
use string_tuner::command_reader::CommandReader;
use string_tuner::config::{StartOrdering, TunerConfig};
use string_tuner::console_display::ConsoleDisplay;
use string_tuner::controller::TunerController;
use string_tuner::estimation::EstimationService;
use string_tuner::http_client::HttpEstimationClient;
use string_tuner::simulator::SimulatedEstimator;
use string_tuner::types::*;

use clap::Parser;
use crossbeam_channel::{bounded, unbounded};
use log::{error, info, warn};
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "string-tuner")]
#[command(about = "Instrument tuner driven by a remote pitch-estimation service")]
struct Cli {
    /// Estimation service base URL (overrides config)
    #[arg(long)]
    server: Option<String>,

    /// Use the built-in simulated estimator instead of a server
    #[arg(long)]
    simulate: bool,

    /// Simulated per-request latency jitter (ms), to exercise out-of-order replies
    #[arg(long, default_value_t = 0)]
    sim_jitter_ms: u64,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in string catalog: guitar, banjo, ukulele, violin
    #[arg(long, default_value = "guitar")]
    instrument: Instrument,

    /// JSON string catalog (overrides --instrument)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// In-tune tolerance in Hz
    #[arg(long)]
    tolerance: Option<f64>,

    /// "Close enough" band in Hz
    #[arg(long)]
    close_band: Option<f64>,

    /// Disable the close band
    #[arg(long, conflicts_with = "close_band")]
    no_close_band: bool,

    /// Poll interval in ms
    #[arg(long)]
    poll_ms: Option<u64>,

    /// await-ack or fire-and-forget
    #[arg(long)]
    start_ordering: Option<StartOrdering>,

    /// Do not send /start_estimation and /stop_estimation
    #[arg(long)]
    no_session_notify: bool,

    /// Per-request timeout in ms (default: none)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Skip ticks while this many estimate requests are outstanding
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Start in auto mode (target follows the closest string)
    #[arg(long)]
    auto: bool,

    /// Start estimating immediately
    #[arg(long)]
    autostart: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,

    /// Disable the console dashboard (frames are still logged at trace level)
    #[arg(long)]
    no_console: bool,
}

impl Cli {
    fn apply(&self, config: &mut TunerConfig) {
        if let Some(url) = &self.server {
            config.server_url = url.clone();
        }
        if let Some(t) = self.tolerance {
            config.tolerance_hz = t;
        }
        if let Some(b) = self.close_band {
            config.close_band_hz = Some(b);
        }
        if self.no_close_band {
            config.close_band_hz = None;
        }
        if let Some(ms) = self.poll_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(o) = self.start_ordering {
            config.start_ordering = o;
        }
        if self.no_session_notify {
            config.notify_session = false;
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout_ms = Some(ms);
        }
        if let Some(n) = self.max_in_flight {
            config.max_in_flight = n;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match TunerConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Config {:?}: {}", path, e);
                process::exit(2);
            }
        },
        None => TunerConfig::default(),
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("{}", e);
        process::exit(2);
    }

    let catalog = match &cli.catalog {
        Some(path) => match Catalog::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!("Catalog {:?}: {}", path, e);
                process::exit(2);
            }
        },
        None => cli.instrument.catalog(),
    };
    if catalog.is_empty() {
        warn!("Catalog {:?} is empty: auto mode will never retarget", catalog.name);
    }

    let service: Arc<dyn EstimationService> = if cli.simulate {
        Arc::new(
            SimulatedEstimator::new(catalog.strings.clone())
                .with_latency_jitter(Duration::from_millis(cli.sim_jitter_ms)),
        )
    } else {
        match HttpEstimationClient::new(&config.server_url, config.request_timeout()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                error!("{}", e);
                process::exit(2);
            }
        }
    };

    info!("═══════════════════════════════════════════════");
    info!("  STRING TUNER v{}", env!("CARGO_PKG_VERSION"));
    info!("  Catalog: {} ({} strings)", catalog.name, catalog.len());
    if cli.simulate {
        info!("  Estimator: SIMULATOR");
    } else {
        info!("  Estimator: {}", config.server_url);
    }
    info!(
        "  Poll: {} ms, tolerance {} Hz, close band {}",
        config.poll_interval_ms,
        config.tolerance_hz,
        config
            .close_band_hz
            .map(|b| format!("{} Hz", b))
            .unwrap_or_else(|| "off".into())
    );
    info!("═══════════════════════════════════════════════");

    // Channel: commands + poll results → controller
    let (event_tx, event_rx) = unbounded::<ControlEvent>();

    // Channels: controller → displays
    let mut frame_txs: Vec<crossbeam_channel::Sender<TunerFrame>> = Vec::new();
    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if !cli.no_console {
        let (tx, rx) = bounded::<TunerFrame>(256);
        frame_txs.push(tx);
        let hz = cli.display_hz;
        handles.push(spawn_or_exit("display", move || {
            ConsoleDisplay::new(rx, hz).run();
        }));
    }

    // ─── Command input ──────────────────────────────────────────────
    let cmd_tx = event_tx.clone();
    // Not joined: it may be blocked on stdin when the controller exits
    spawn_or_exit("commands", move || {
        CommandReader::new(io::stdin().lock(), cmd_tx).run();
    });

    if cli.autostart {
        let _ = event_tx.send(ControlEvent::Start);
    }

    // ─── Controller (on this thread) ────────────────────────────────
    let mut controller = TunerController::new(config, catalog, service, event_tx, frame_txs)
        .with_auto_mode(cli.auto);
    controller.run(&event_rx);
    // Closes the frame channels so the display exits
    drop(controller);

    for h in handles {
        let _ = h.join();
    }
}

fn spawn_or_exit<F>(name: &str, f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name(name.into()).spawn(f) {
        Ok(h) => h,
        Err(e) => {
            error!("Failed to spawn {} thread: {}", name, e);
            process::exit(1);
        }
    }
}
