//! Televoodoo host runtime.
//!
//! Receives 6-DoF poses from a handheld tracker over TCP (WiFi/USB) or BLE
//! and delivers a normalized, safety-limited, optionally rate-reshaped pose
//! stream to a user callback:
//!
//! ```ignore
//! use televoodoo::{Session, SessionOptions};
//! use std::sync::Arc;
//!
//! let callback = Arc::new(|event| {
//!     println!("{}", serde_json::to_string(&event)?);
//!     Ok(())
//! });
//! let session = Session::start(SessionOptions::default(), callback).await?;
//! session.wait().await?;
//! ```

mod chain;
mod credentials;

pub use server::{ServerConfig, ServerError, TcpServer};
pub use transforms::{AbsolutePose, DeltaPose, PoseProvider, Velocity};
pub use types::{Event, OutputConfig, Pose, PoseSample};

use chain::EventChain;
use pipeline::{spawn_upsampler, MotionLimiter, Resampler, ResamplerConfig};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use types::EventSink;

/// Error type callbacks may return; failures are logged, never fatal.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// User callback receiving every event of the session.
///
/// Invoked on whatever task processed the event, potentially concurrently
/// with the caller's own threads.
pub type Callback = Arc<dyn Fn(Event) -> Result<(), CallbackError> + Send + Sync>;

/// Connection backend selection. `Tcp` covers both WiFi and USB links (the
/// tracker discovers the host via UDP beacons either way).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connection {
    #[default]
    Auto,
    Tcp,
    Ble,
}

impl Connection {
    /// `Auto` resolves to TCP: lower latency than BLE and no platform
    /// Bluetooth dependencies.
    fn resolve(self) -> Connection {
        match self {
            Connection::Auto => Connection::Tcp,
            other => other,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Connection::Auto => "auto",
            Connection::Tcp => "tcp",
            Connection::Ble => "ble",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[cfg(feature = "ble")]
    #[error(transparent)]
    Ble(#[from] ble::BleError),
    #[error("BLE support not compiled in; rebuild with the `ble` feature")]
    BleUnavailable,
    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Options for [`Session::start`]. Field-level options win over the same
/// settings inside `config`.
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Service name; random `voodooXX` when absent here and in the config.
    pub name: Option<String>,
    /// 6-char bearer code; random when absent here and in the config.
    pub code: Option<String>,
    pub connection: Connection,
    /// TCP data port; `None` uses the protocol default (50000).
    pub tcp_port: Option<u16>,
    /// UDP beacon port; `None` uses the protocol default (50001).
    pub beacon_port: Option<u16>,
    pub upsample_to_hz: Option<f64>,
    pub rate_limit_hz: Option<f64>,
    /// `None` enables regulated timing whenever upsampling is on.
    pub regulated: Option<bool>,
    pub vel_limit: Option<f64>,
    pub acc_limit: Option<f64>,
    /// Full configuration record; consulted for credentials and pipeline
    /// settings not given directly.
    pub config: Option<OutputConfig>,
    /// Pushed to the tracker as CONFIG right after authentication.
    pub initial_config: Map<String, Value>,
    /// Suppress high-frequency output and motion-limit warnings.
    pub quiet: bool,
}

enum Backend {
    Tcp(TcpServer),
    #[cfg(feature = "ble")]
    Ble(Arc<ble::BlePeripheral>),
}

struct HandleInner {
    backend: Backend,
    shutdown_tx: watch::Sender<bool>,
}

/// Thread-safe handle to a running session: haptic/config pushes and
/// cooperative shutdown, usable from any thread.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    /// Send haptic feedback, normalizing `value` from `[min, max]` to an
    /// intensity in `[0, 1]`. Returns false without a connected tracker.
    pub fn send_haptic(&self, value: f64, min: f64, max: f64) -> bool {
        let intensity = normalize_haptic(value, min, max);
        match &self.inner.backend {
            Backend::Tcp(server) => server.send_haptic(intensity),
            #[cfg(feature = "ble")]
            Backend::Ble(peripheral) => peripheral.send_haptic(intensity),
        }
    }

    /// Merge fields into the live config and push the snapshot to the
    /// tracker.
    pub fn send_config(&self, partial: Map<String, Value>) -> bool {
        match &self.inner.backend {
            Backend::Tcp(server) => server.send_config(partial),
            #[cfg(feature = "ble")]
            Backend::Ble(peripheral) => peripheral.send_config(partial),
        }
    }

    /// The bound TCP port once the server is listening (0 before that,
    /// `None` on BLE).
    pub fn tcp_port(&self) -> Option<u16> {
        match &self.inner.backend {
            Backend::Tcp(server) => Some(server.local_port()),
            #[cfg(feature = "ble")]
            Backend::Ble(_) => None,
        }
    }

    /// Cooperative shutdown: closes the session (BYE to the tracker), tears
    /// down beacons and workers.
    pub fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        match &self.inner.backend {
            Backend::Tcp(server) => server.stop(),
            #[cfg(feature = "ble")]
            Backend::Ble(peripheral) => peripheral.stop(),
        }
    }
}

/// A running televoodoo session.
pub struct Session {
    handle: SessionHandle,
    driver: JoinHandle<Result<(), SessionError>>,
    upsampler: Option<JoinHandle<()>>,
}

impl Session {
    /// Resolve credentials and pipeline settings, emit the pairing `session`
    /// event, and start the selected transport. Bind and adapter failures
    /// are fatal; everything after start-up is reported through events.
    pub async fn start(options: SessionOptions, callback: Callback) -> Result<Session, SessionError> {
        let config = options.config.clone().unwrap_or_default();

        let (generated_name, generated_code) = credentials::generate();
        let (config_name, config_code) = {
            let (name, code) = config.credentials();
            (name.map(str::to_string), code.map(str::to_string))
        };
        let name = options
            .name
            .clone()
            .or(config_name)
            .unwrap_or(generated_name);
        let code = options
            .code
            .clone()
            .or(config_code)
            .unwrap_or(generated_code);

        let upsample_to_hz = options
            .upsample_to_hz
            .or(config.upsample_to_frequency_hz)
            .filter(|hz| *hz > 0.0);
        let rate_limit_hz = options
            .rate_limit_hz
            .or(config.rate_limit_frequency_hz)
            .filter(|hz| *hz > 0.0);
        let vel_limit = options.vel_limit.or(config.vel_limit);
        let acc_limit = options.acc_limit.or(config.acc_limit);
        // Regulated timing by default whenever upsampling is on
        let regulated = options.regulated.unwrap_or(upsample_to_hz.is_some());

        let connection = options.connection.resolve();
        let tcp_port = options.tcp_port.unwrap_or(protocol::TCP_DATA_PORT);
        let beacon_port = options.beacon_port.unwrap_or(protocol::UDP_BEACON_PORT);

        let limiter = (vel_limit.is_some() || acc_limit.is_some())
            .then(|| MotionLimiter::new(vel_limit, acc_limit));
        let resampler = (upsample_to_hz.is_some() || rate_limit_hz.is_some()).then(|| {
            Arc::new(Resampler::new(ResamplerConfig {
                upsample_to_hz,
                rate_limit_hz,
                regulated,
            }))
        });

        let chain = Arc::new(EventChain::new(
            limiter,
            resampler,
            callback,
            options.quiet,
        ));

        // Pairing display: the session event carries everything the tracker
        // app needs (QR rendering is left to the consumer)
        chain.deliver(Event::Session {
            name: name.clone(),
            code: code.clone(),
            transport: connection.as_str().to_string(),
            port: matches!(connection, Connection::Tcp).then_some(tcp_port),
        });

        if vel_limit.is_some() || acc_limit.is_some() {
            info!(?vel_limit, ?acc_limit, "motion limiting enabled");
            chain.deliver(Event::MotionLimitingEnabled {
                vel_limit,
                acc_limit,
            });
        }
        if upsample_to_hz.is_some() {
            info!(?upsample_to_hz, ?rate_limit_hz, regulated, "resampling enabled");
            chain.deliver(Event::ResamplingEnabled {
                upsample_to_hz,
                rate_limit_hz,
                regulated,
            });
        }

        let (shutdown_tx, _) = watch::channel(false);
        let sink: EventSink = {
            let chain = Arc::clone(&chain);
            Arc::new(move |event| chain.feed(event))
        };

        let upsampler = chain.resampler().filter(|_| upsample_to_hz.is_some()).map(|resampler| {
            let chain = Arc::clone(&chain);
            spawn_upsampler(
                resampler,
                move |sample| chain.emit_upsampled(sample),
                shutdown_tx.subscribe(),
            )
        });

        match connection {
            Connection::Tcp | Connection::Auto => {
                let server = TcpServer::new(
                    ServerConfig {
                        name,
                        code,
                        tcp_port,
                        beacon_port,
                        initial_config: options.initial_config.clone(),
                    },
                    sink,
                );
                let driver = {
                    let server = server.clone();
                    tokio::spawn(async move { server.run().await.map_err(SessionError::from) })
                };
                Ok(Session {
                    handle: SessionHandle {
                        inner: Arc::new(HandleInner {
                            backend: Backend::Tcp(server),
                            shutdown_tx,
                        }),
                    },
                    driver,
                    upsampler,
                })
            }
            Connection::Ble => {
                #[cfg(feature = "ble")]
                {
                    let peripheral = Arc::new(ble::BlePeripheral::new(
                        ble::BleConfig {
                            name,
                            code,
                            initial_config: options.initial_config.clone(),
                        },
                        sink,
                    ));
                    let driver = {
                        let peripheral = Arc::clone(&peripheral);
                        tokio::spawn(async move {
                            peripheral.run().await.map_err(SessionError::from)
                        })
                    };
                    Ok(Session {
                        handle: SessionHandle {
                            inner: Arc::new(HandleInner {
                                backend: Backend::Ble(peripheral),
                                shutdown_tx,
                            }),
                        },
                        driver,
                        upsampler,
                    })
                }
                #[cfg(not(feature = "ble"))]
                {
                    if let Some(task) = upsampler {
                        task.abort();
                    }
                    Err(SessionError::BleUnavailable)
                }
            }
        }
    }

    /// Clonable handle for haptic/config pushes and shutdown from other
    /// threads.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Request shutdown without waiting.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Block until the session ends (BYE, transport loss, or `stop`).
    pub async fn wait(self) -> Result<(), SessionError> {
        let result = self.driver.await?;
        // Stop the upsampler once the transport is gone; give it a second
        // to drain, then abandon it
        let _ = self.handle.inner.shutdown_tx.send(true);
        if let Some(task) = self.upsampler {
            if tokio::time::timeout(std::time::Duration::from_secs(1), task)
                .await
                .is_err()
            {
                tracing::warn!("upsampler did not stop in time");
            }
        }
        result
    }
}

/// Start a session and block until it ends.
pub async fn run_session(options: SessionOptions, callback: Callback) -> Result<(), SessionError> {
    let session = Session::start(options, callback).await?;
    session.wait().await
}

/// Map `value` from `[min, max]` to a haptic intensity in `[0, 1]`.
fn normalize_haptic(value: f64, min: f64, max: f64) -> f32 {
    if max == min {
        return 0.5;
    }
    (((value - min) / (max - min)).clamp(0.0, 1.0)) as f32
}
