//! ADS-B Monitor - terminal view of aircraft decoded by readsb

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use adsb_monitor::aircraft_tracker::AircraftTrack;
use adsb_monitor::config::{Config, OutputFormat};
use adsb_monitor::decoder::{MonitorSession, UpstreamFailure};
use adsb_monitor::display;
use adsb_monitor::pipeline::TrackView;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";

/// One refresh in JSON output mode
#[derive(Serialize)]
struct JsonFrame<'a> {
    timestamp: DateTime<Utc>,
    receiving: bool,
    total: usize,
    aircraft: &'a [AircraftTrack],
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout belongs to the live view
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   ADS-B Monitor");
    info!("   readsb verbose output decoder");
    info!("===========================================");

    let config = Config::from_env();

    info!("Configuration:");
    info!("  readsb path: {}", config.readsb_path);
    info!("  Device type: {}", config.device_type);
    info!("  Gain: {} dB", config.gain_db);
    info!("  Frequency: {} Hz", config.frequency_hz);
    match config.reference() {
        Some(reference) => info!("  Receiver position: {}", reference),
        None => info!("  Receiver position: not set"),
    }
    info!("  Local decoding: {}", config.local_decoding);

    if config.local_decoding && config.reference().is_none() {
        warn!("Local decoding needs RECEIVER_LAT and RECEIVER_LON, using global decoding only");
    }

    let session = match MonitorSession::start(&config) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to start readsb: {:#}", e);
            error!("Make sure readsb is installed and READSB_PATH points at it.");
            return Err(e);
        }
    };
    let view = session.view();
    let failures = session.failures();

    info!("Monitoring started. Press Ctrl+C to stop.");

    let mut refresh = tokio::time::interval(Duration::from_millis(config.refresh_interval_ms));
    let mut last_failure: Option<UpstreamFailure> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = refresh.tick() => {
                if let Some(failure) = failures.try_iter().last() {
                    last_failure = Some(failure);
                }
                if let Err(e) = render(&config, &view, last_failure.as_ref()) {
                    warn!("Failed to write view: {}", e);
                }
                if !session.is_running() {
                    warn!("readsb stopped unexpectedly");
                    break;
                }
            }
        }
    }

    session.stop().await?;

    info!("Shutdown complete. {}", view.tracker_stats());
    Ok(())
}

fn render(config: &Config, view: &TrackView, last_failure: Option<&UpstreamFailure>) -> Result<()> {
    let now = Utc::now();
    let (rows, total) = view.display_rows(now);
    let receiving = view.stats().has_received_data();
    let mut stdout = std::io::stdout().lock();

    if config.output_format == OutputFormat::Json {
        let frame = JsonFrame {
            timestamp: now,
            receiving,
            total,
            aircraft: &rows,
        };
        writeln!(stdout, "{}", serde_json::to_string(&frame)?)?;
        return Ok(());
    }

    write!(stdout, "{CLEAR_SCREEN}")?;
    write!(stdout, "{}", display::render_header(now, config.debug_raw, receiving))?;
    if let Some(failure) = last_failure {
        writeln!(stdout, "READSB ERROR: {failure}")?;
    }
    if config.debug_raw {
        let lines = view.recent_lines(display::RAW_DISPLAY_LINES);
        write!(stdout, "{}", display::render_raw(&lines))?;
    } else {
        write!(stdout, "{}", display::render_table(&rows, total))?;
    }
    writeln!(stdout, "\nPress Ctrl+C to stop.")?;
    stdout.flush()?;
    Ok(())
}
