//! televoodood — host daemon for televoodoo 6-DoF pose streaming.
//!
//! Starts a session, prints one compact JSON event per line to stdout (the
//! machine-readable stream consumers parse), and sends internal diagnostics
//! to stderr via tracing. Pose events run through `PoseProvider::transform`
//! so the output sections follow the configured `logData` flags.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use televoodoo::{Callback, Connection, Event, OutputConfig, PoseProvider, Session, SessionOptions};
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "televoodood", about = "Televoodoo 6-DoF pose streaming host")]
struct Args {
    /// Path to a configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Static service name (default: randomly generated voodooXX)
    #[arg(long)]
    name: Option<String>,

    /// Static authentication code (default: random 6-char code)
    #[arg(long)]
    code: Option<String>,

    /// Connection backend
    #[arg(long, value_enum, default_value_t = ConnectionArg::Auto)]
    connection: ConnectionArg,

    /// TCP data port
    #[arg(long, default_value_t = protocol::TCP_DATA_PORT)]
    tcp_port: u16,

    /// UDP beacon broadcast port
    #[arg(long, default_value_t = protocol::UDP_BEACON_PORT)]
    beacon_port: u16,

    /// Upsample poses to this frequency via linear extrapolation
    #[arg(long)]
    upsample_to_hz: Option<f64>,

    /// Limit output to this maximum frequency
    #[arg(long)]
    rate_limit_hz: Option<f64>,

    /// Force regulated (true) or zero-latency (false) timing when
    /// upsampling; the default regulates whenever upsampling is on
    #[arg(long)]
    regulated: Option<bool>,

    /// Maximum velocity in m/s; faster motion is clamped
    #[arg(long)]
    vel_limit: Option<f64>,

    /// Maximum acceleration in m/s², symmetric
    #[arg(long)]
    acc_limit: Option<f64>,

    /// Suppress high-frequency output (pose, heartbeat)
    #[arg(long)]
    quiet: bool,

    /// Print USB tethering/internet-sharing setup hints
    #[arg(long)]
    usb_hints: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional directory for daily-rolling log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConnectionArg {
    Auto,
    Tcp,
    Ble,
}

impl From<ConnectionArg> for Connection {
    fn from(arg: ConnectionArg) -> Self {
        match arg {
            ConnectionArg::Auto => Connection::Auto,
            ConnectionArg::Tcp => Connection::Tcp,
            ConnectionArg::Ble => Connection::Ble,
        }
    }
}

fn load_output_config(path: &Path) -> Result<OutputConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON config {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("invalid TOML config {}", path.display()))?
    };
    Ok(config)
}

/// Write one compact JSON line to stdout, flushed immediately so consumers
/// reading a pipe see events as they happen.
fn print_json_line(value: &serde_json::Value) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    serde_json::to_writer(&mut lock, value)?;
    lock.write_all(b"\n")?;
    lock.flush()
}

fn init_logging(
    level: &str,
    log_dir: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("televoodood={level},televoodoo={level},server={level},pipeline={level}")));

    // Event JSON owns stdout, so diagnostics go to stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "televoodood.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        Ok(None)
    }
}

fn usb_setup_event() -> Event {
    Event::UsbSetupInfo {
        message: "USB connection requires different setup for iOS vs Android".into(),
        ios_setup: "iOS tunnels TCP via usbmuxd: built-in on macOS, \
                    `apt install libimobiledevice6 usbmuxd` on Linux, iTunes drivers on Windows"
            .into(),
        android_setup: "Enable USB Tethering in Android settings; the beacon reaches the \
                        tethered interface automatically"
            .into(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The guard must live for the whole run so file logs are flushed
    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    let config = match &args.config {
        Some(path) => {
            let config = load_output_config(path)?;
            info!(path = %path.display(), "Loaded config");
            config
        }
        None => OutputConfig::default(),
    };

    let quiet = args.quiet;
    let provider = Arc::new(Mutex::new(PoseProvider::new(config.clone())));
    let callback: Callback = Arc::new(move |event: Event| {
        if quiet && event.is_high_frequency() {
            return Ok(());
        }
        let value = match &event {
            Event::Pose { data } => {
                let mut provider = match provider.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let transformed = provider.transform(&data.absolute_input.pose);
                serde_json::json!({"type": "pose", "data": transformed})
            }
            other => serde_json::to_value(other)?,
        };
        print_json_line(&value)?;
        Ok(())
    });

    if args.usb_hints {
        let _ = callback(usb_setup_event());
    }

    let options = SessionOptions {
        name: args.name.clone(),
        code: args.code.clone(),
        connection: args.connection.into(),
        tcp_port: Some(args.tcp_port),
        beacon_port: Some(args.beacon_port),
        upsample_to_hz: args.upsample_to_hz,
        rate_limit_hz: args.rate_limit_hz,
        regulated: args.regulated,
        vel_limit: args.vel_limit,
        acc_limit: args.acc_limit,
        config: Some(config),
        initial_config: serde_json::Map::new(),
        quiet,
    };

    let session = Session::start(options, callback)
        .await
        .context("failed to start session")?;

    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            handle.stop();
        }
    });

    session.wait().await.context("session failed")?;
    Ok(())
}
