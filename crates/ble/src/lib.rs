//! BLE GATT peripheral transport for televoodoo, backed by BlueZ.
//!
//! A single primary service exposes the write characteristics the tracker
//! uses (auth, pose, command, legacy control) and the notify
//! characteristics the host drives (heartbeat at 2 Hz, haptic, config).
//! BLE carries no framing: every characteristic write and notification is
//! exactly one wire message.

use bluer::adv::Advertisement;
use bluer::gatt::local::{
    Application, Characteristic, CharacteristicNotify, CharacteristicNotifyMethod,
    CharacteristicRead, CharacteristicWrite, CharacteristicWriteMethod, Service,
};
use bluer::Uuid;
use protocol::{ConfigMsg, Haptic, Heartbeat, Message};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use types::{CommandName, DisconnectReason, Event, EventSink};

pub const SERVICE_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF61");
pub const CHAR_CONTROL_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF62");
pub const CHAR_AUTH_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF63");
pub const CHAR_POSE_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF64");
pub const CHAR_HEARTBEAT_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF65");
pub const CHAR_COMMAND_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF66");
pub const CHAR_HAPTIC_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF67");
pub const CHAR_CONFIG_UUID: Uuid = uuid::uuid!("1C8FD138-FC18-4846-954D-E509366AEF68");

/// Heartbeat notification period (2 Hz).
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// A BLE session times out after this much write silence.
const SESSION_SILENCE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum BleError {
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),
}

/// BLE peripheral configuration.
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Advertised local name.
    pub name: String,
    /// Bearer code expected on the AUTH characteristic.
    pub code: String,
    /// Config snapshot served and notified on the CONFIG characteristic.
    pub initial_config: Map<String, Value>,
}

struct Shared {
    config: BleConfig,
    sink: EventSink,
    started: Instant,
    heartbeat_counter: AtomicU32,
    authenticated: AtomicBool,
    last_seen: Mutex<Option<Instant>>,
    latest_haptic: Mutex<Vec<u8>>,
    haptic_signal: Notify,
    current_config: Mutex<Map<String, Value>>,
    config_signal: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl Shared {
    fn emit(&self, event: Event) {
        (self.sink)(event);
    }

    fn touch(&self) {
        let mut guard = lock(&self.last_seen);
        *guard = Some(Instant::now());
    }

    fn heartbeat_bytes(&self) -> Vec<u8> {
        let uptime_ms = (self.started.elapsed().as_millis() & 0xFFFF_FFFF) as u32;
        Message::Heartbeat(Heartbeat {
            counter: self.heartbeat_counter.load(Ordering::Relaxed),
            uptime_ms,
        })
        .pack()
    }

    fn config_bytes(&self) -> Vec<u8> {
        let config = lock(&self.current_config).clone();
        Message::Config(ConfigMsg { config }).pack()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// GATT peripheral serving the televoodoo service.
pub struct BlePeripheral {
    shared: Arc<Shared>,
}

impl BlePeripheral {
    pub fn new(config: BleConfig, sink: EventSink) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let latest_haptic = Message::Haptic(Haptic::new(0.0)).pack();
        let current_config = config.initial_config.clone();
        Self {
            shared: Arc::new(Shared {
                config,
                sink,
                started: Instant::now(),
                heartbeat_counter: AtomicU32::new(0),
                authenticated: AtomicBool::new(false),
                last_seen: Mutex::new(None),
                latest_haptic: Mutex::new(latest_haptic),
                haptic_signal: Notify::new(),
                current_config: Mutex::new(current_config),
                config_signal: Notify::new(),
                shutdown_tx,
            }),
        }
    }

    /// Advertise and serve the GATT application until [`BlePeripheral::stop`].
    ///
    /// A missing adapter is fatal and propagates to the caller; everything
    /// after start-up is reported through events.
    pub async fn run(&self) -> Result<(), BleError> {
        let shared = &self.shared;
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        let advertisement = Advertisement {
            service_uuids: std::iter::once(SERVICE_UUID).collect(),
            discoverable: Some(true),
            local_name: Some(shared.config.name.clone()),
            ..Default::default()
        };
        let adv_handle = adapter.advertise(advertisement).await?;

        let app_handle = adapter
            .serve_gatt_application(self.application())
            .await?;

        info!(name = %shared.config.name, adapter = %adapter.name(), "BLE peripheral advertising");
        shared.emit(Event::BleAdvertising {
            name: shared.config.name.clone(),
        });

        // Silence watchdog: an authenticated tracker that stops writing is
        // declared gone
        let watchdog = {
            let shared = Arc::clone(shared);
            let mut shutdown_rx = shared.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(500));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if !shared.authenticated.load(Ordering::SeqCst) {
                                continue;
                            }
                            let last_seen: Option<Instant> = *lock(&shared.last_seen);
                            let stale = last_seen
                                .map(|seen| seen.elapsed() > SESSION_SILENCE_TIMEOUT)
                                .unwrap_or(false);
                            if stale {
                                warn!("BLE session silence timeout");
                                shared.authenticated.store(false, Ordering::SeqCst);
                                shared.emit(Event::Disconnected {
                                    reason: DisconnectReason::Timeout,
                                    client: None,
                                });
                            }
                        }
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let mut shutdown_rx = shared.shutdown_tx.subscribe();
        loop {
            if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
                break;
            }
        }

        let _ = watchdog.await;
        drop(app_handle);
        drop(adv_handle);
        Ok(())
    }

    /// Flip the shutdown flag; `run` unwinds advertising and the GATT app.
    pub fn stop(&self) {
        let _ = self.shared.shutdown_tx.send(true);
    }

    /// Update the haptic characteristic and notify subscribers. Mirrors the
    /// TCP server: a no-op without an authenticated session.
    pub fn send_haptic(&self, intensity: f32) -> bool {
        if !self.shared.authenticated.load(Ordering::SeqCst) {
            return false;
        }
        *lock(&self.shared.latest_haptic) = Message::Haptic(Haptic::new(intensity)).pack();
        self.shared.haptic_signal.notify_waiters();
        true
    }

    /// Merge fields into the config snapshot and notify subscribers.
    pub fn send_config(&self, partial: Map<String, Value>) -> bool {
        if !self.shared.authenticated.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut config = lock(&self.shared.current_config);
            for (key, value) in partial {
                config.insert(key, value);
            }
        }
        self.shared.config_signal.notify_waiters();
        true
    }

    fn application(&self) -> Application {
        Application {
            services: vec![Service {
                uuid: SERVICE_UUID,
                primary: true,
                characteristics: vec![
                    self.control_characteristic(),
                    self.auth_characteristic(),
                    self.pose_characteristic(),
                    self.heartbeat_characteristic(),
                    self.command_characteristic(),
                    self.haptic_characteristic(),
                    self.config_characteristic(),
                ],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn control_characteristic(&self) -> Characteristic {
        let shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_CONTROL_UUID,
            write: Some(CharacteristicWrite {
                write: true,
                write_without_response: true,
                method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                    let shared = Arc::clone(&shared);
                    Box::pin(async move {
                        let cmd = String::from_utf8_lossy(&value).into_owned();
                        shared.touch();
                        shared.emit(Event::BleControl { cmd });
                        Ok(())
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn auth_characteristic(&self) -> Characteristic {
        let shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_AUTH_UUID,
            write: Some(CharacteristicWrite {
                write: true,
                write_without_response: true,
                method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                    let shared = Arc::clone(&shared);
                    Box::pin(async move {
                        let presented = auth_code_from_write(&value);
                        shared.touch();
                        if presented == shared.config.code {
                            shared.authenticated.store(true, Ordering::SeqCst);
                            shared.emit(Event::BleAuthOk);
                        } else {
                            shared.emit(Event::BleAuthFailed);
                        }
                        Ok(())
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pose_characteristic(&self) -> Characteristic {
        let shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_POSE_UUID,
            write: Some(CharacteristicWrite {
                write: true,
                write_without_response: true,
                method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                    let shared = Arc::clone(&shared);
                    Box::pin(async move {
                        // Writes from peers that never presented the bearer
                        // code are dropped silently
                        if !shared.authenticated.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                        shared.touch();
                        match Message::parse(&value) {
                            Ok(Message::Pose(pose)) => {
                                shared.emit(Event::pose(pose.to_pose().into()));
                            }
                            _ => {
                                shared.emit(Event::Error {
                                    message: "Invalid POSE packet".into(),
                                });
                            }
                        }
                        Ok(())
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn command_characteristic(&self) -> Characteristic {
        let shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_COMMAND_UUID,
            write: Some(CharacteristicWrite {
                write: true,
                write_without_response: true,
                method: CharacteristicWriteMethod::Fun(Box::new(move |value, _req| {
                    let shared = Arc::clone(&shared);
                    Box::pin(async move {
                        // Same gate as the pose characteristic: no commands
                        // without the bearer code
                        if !shared.authenticated.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                        shared.touch();
                        match Message::parse(&value) {
                            Ok(Message::Cmd(cmd)) => {
                                let name = match cmd.cmd_type {
                                    protocol::CmdType::Recording => CommandName::Recording,
                                    protocol::CmdType::KeepRecording => {
                                        CommandName::KeepRecording
                                    }
                                };
                                shared.emit(Event::Command {
                                    name,
                                    value: cmd.value != 0,
                                });
                            }
                            _ => {
                                shared.emit(Event::Error {
                                    message: "Invalid CMD packet".into(),
                                });
                            }
                        }
                        Ok(())
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn heartbeat_characteristic(&self) -> Characteristic {
        let read_shared = Arc::clone(&self.shared);
        let notify_shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_HEARTBEAT_UUID,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |_req| {
                    let shared = Arc::clone(&read_shared);
                    Box::pin(async move {
                        shared.emit(Event::Heartbeat);
                        Ok(shared.heartbeat_bytes())
                    })
                }),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
                    let shared = Arc::clone(&notify_shared);
                    Box::pin(async move {
                        debug!("heartbeat subscriber connected");
                        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                        loop {
                            ticker.tick().await;
                            if notifier.is_stopped() {
                                break;
                            }
                            let counter = shared
                                .heartbeat_counter
                                .load(Ordering::Relaxed)
                                .wrapping_add(1);
                            shared.heartbeat_counter.store(counter, Ordering::Relaxed);
                            if notifier.notify(shared.heartbeat_bytes()).await.is_err() {
                                break;
                            }
                        }
                        debug!("heartbeat subscriber gone");
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn haptic_characteristic(&self) -> Characteristic {
        let read_shared = Arc::clone(&self.shared);
        let notify_shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_HAPTIC_UUID,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |_req| {
                    let shared = Arc::clone(&read_shared);
                    Box::pin(async move { Ok(lock(&shared.latest_haptic).clone()) })
                }),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
                    let shared = Arc::clone(&notify_shared);
                    Box::pin(async move {
                        loop {
                            shared.haptic_signal.notified().await;
                            if notifier.is_stopped() {
                                break;
                            }
                            let payload = lock(&shared.latest_haptic).clone();
                            if notifier.notify(payload).await.is_err() {
                                break;
                            }
                        }
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn config_characteristic(&self) -> Characteristic {
        let read_shared = Arc::clone(&self.shared);
        let notify_shared = Arc::clone(&self.shared);
        Characteristic {
            uuid: CHAR_CONFIG_UUID,
            read: Some(CharacteristicRead {
                read: true,
                fun: Box::new(move |_req| {
                    let shared = Arc::clone(&read_shared);
                    Box::pin(async move { Ok(shared.config_bytes()) })
                }),
                ..Default::default()
            }),
            notify: Some(CharacteristicNotify {
                notify: true,
                method: CharacteristicNotifyMethod::Fun(Box::new(move |mut notifier| {
                    let shared = Arc::clone(&notify_shared);
                    Box::pin(async move {
                        // Initial snapshot on subscribe, then on every update
                        if notifier.notify(shared.config_bytes()).await.is_err() {
                            return;
                        }
                        loop {
                            shared.config_signal.notified().await;
                            if notifier.is_stopped() {
                                break;
                            }
                            if notifier.notify(shared.config_bytes()).await.is_err() {
                                break;
                            }
                        }
                    })
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Decode the bearer code from an AUTH write: UTF-8, null padding stripped.
fn auth_code_from_write(value: &[u8]) -> String {
    let end = value
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(value.len());
    String::from_utf8_lossy(&value[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_code_decoding() {
        assert_eq!(auth_code_from_write(b"ABC123"), "ABC123");
        assert_eq!(auth_code_from_write(b"AB\0\0\0\0"), "AB");
        assert_eq!(auth_code_from_write(b""), "");
    }
}
