//! TCP server for televoodoo pose streaming with UDP beacon discovery.
//!
//! The server is transport-agnostic between WiFi and USB: it binds to all
//! interfaces and broadcasts UDP beacons, so the tracker discovers it via
//! beacons regardless of which network interface carries the link. At most
//! one client session exists at a time; additional connections are answered
//! with a BUSY ACK and closed.

mod beacon;

use protocol::{Ack, AckStatus, Bye, ConfigMsg, Haptic, Message};
use serde_json::{Map, Value};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use types::{CommandName, DisconnectReason, Event, EventSink, RejectReason};

/// Deadline for the client's HELLO after connecting.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound message queue depth per session.
const OUTBOUND_QUEUE: usize = 32;

/// Socket buffer size applied to accepted connections (small for latency).
const SOCKET_BUFFER_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),
}

/// TCP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Service name advertised in beacons.
    pub name: String,
    /// Bearer code the tracker must present in HELLO.
    pub code: String,
    /// TCP data port; 0 binds an ephemeral port.
    pub tcp_port: u16,
    /// UDP beacon broadcast port.
    pub beacon_port: u16,
    /// Configuration snapshot pushed as CONFIG right after ACK OK.
    pub initial_config: Map<String, Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "voodoo".to_string(),
            code: String::new(),
            tcp_port: protocol::TCP_DATA_PORT,
            beacon_port: protocol::UDP_BEACON_PORT,
            initial_config: Map::new(),
        }
    }
}

/// Active client session (at most one per server).
struct SessionState {
    addr: SocketAddr,
    session_id: u32,
    authenticated: bool,
    config: Map<String, Value>,
    outbound: mpsc::Sender<Message>,
}

struct Inner {
    config: ServerConfig,
    sink: EventSink,
    session: Mutex<Option<SessionState>>,
    shutdown_tx: watch::Sender<bool>,
    local_port: AtomicU16,
    running: AtomicBool,
}

impl Inner {
    fn emit(&self, event: Event) {
        (self.sink)(event);
    }

    fn session_lock(&self) -> MutexGuard<'_, Option<SessionState>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Single-client TCP pose streaming server.
#[derive(Clone)]
pub struct TcpServer {
    inner: Arc<Inner>,
}

impl TcpServer {
    pub fn new(config: ServerConfig, sink: EventSink) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                session: Mutex::new(None),
                shutdown_tx,
                local_port: AtomicU16::new(0),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// The actually bound TCP port, available once the server is listening.
    pub fn local_port(&self) -> u16 {
        self.inner.local_port.load(Ordering::SeqCst)
    }

    /// Run the server until [`TcpServer::stop`] is called. Bind failures are
    /// fatal and propagate to the caller. Idempotent: a second call while
    /// running returns immediately.
    pub async fn run(&self) -> Result<(), ServerError> {
        let inner = &self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let local_ip = local_ip();

        inner.emit(Event::ServerStarting {
            name: inner.config.name.clone(),
            tcp_port: inner.config.tcp_port,
            beacon_port: inner.config.beacon_port,
            ip: local_ip.clone(),
        });

        let socket = tokio::net::TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(std::net::SocketAddr::from(([0, 0, 0, 0], inner.config.tcp_port)))?;
        // Single client: no reason to queue more than one pending connect
        let listener = socket.listen(1)?;
        let tcp_port = listener.local_addr()?.port();
        inner.local_port.store(tcp_port, Ordering::SeqCst);
        info!(port = tcp_port, "TCP server listening");

        let mut shutdown_rx = inner.shutdown_tx.subscribe();
        let beacon_task = tokio::spawn(beacon::broadcast_loop(
            inner.config.name.clone(),
            tcp_port,
            inner.config.beacon_port,
            inner.sink.clone(),
            inner.shutdown_tx.subscribe(),
        ));

        inner.emit(Event::ServerListening {
            ip: local_ip,
            tcp_port,
            beacon_port: inner.config.beacon_port,
            code: inner.config.code.clone(),
        });

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            inner.emit(Event::ConnectionAccepted {
                                client: addr.to_string(),
                            });
                            let inner = Arc::clone(inner);
                            let shutdown_rx = self.inner.shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                handle_connection(inner, stream, addr, shutdown_rx).await;
                            });
                        }
                        Err(e) => {
                            warn!(?e, "accept failed");
                            inner.emit(Event::Error {
                                message: format!("Accept error: {e}"),
                            });
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.close_session();
        drop(listener);
        let _ = beacon_task.await;
        inner.emit(Event::ServerStopped);
        inner.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Flip the shutdown flag; `run` tears everything down and returns.
    pub fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// Queue a HAPTIC message to the connected tracker. Intensity is clamped
    /// to `[0, 1]`. Thread-safe; no-op without an authenticated session.
    pub fn send_haptic(&self, intensity: f32) -> bool {
        let guard = self.inner.session_lock();
        match guard.as_ref() {
            Some(session) if session.authenticated => session
                .outbound
                .try_send(Message::Haptic(Haptic::new(intensity)))
                .is_ok(),
            _ => false,
        }
    }

    /// Merge fields into the live session config and push the merged
    /// snapshot as a CONFIG message. Thread-safe.
    pub fn send_config(&self, partial: Map<String, Value>) -> bool {
        let mut guard = self.inner.session_lock();
        match guard.as_mut() {
            Some(session) if session.authenticated => {
                for (key, value) in partial {
                    session.config.insert(key, value);
                }
                let snapshot = session.config.clone();
                session
                    .outbound
                    .try_send(Message::Config(ConfigMsg { config: snapshot }))
                    .is_ok()
            }
            _ => false,
        }
    }

    /// Close the active session: notify the tracker with BYE, then drop it.
    fn close_session(&self) {
        let taken = self.inner.session_lock().take();
        if let Some(session) = taken {
            let _ = session.outbound.try_send(Message::Bye(Bye {
                session_id: session.session_id,
            }));
            self.inner.emit(Event::Disconnected {
                reason: DisconnectReason::ServerShutdown,
                client: Some(session.addr.to_string()),
            });
        }
    }
}

/// Best-effort local IP discovery (route towards a public address).
fn local_ip() -> String {
    let probe = || -> io::Result<String> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe().unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Low-latency tuning applied to every accepted connection. 60 Hz pose
/// streaming cannot afford Nagle buffering of 46-byte POSE packets, and the
/// keepalive timers declare a vanished peer dead in seconds rather than
/// hours.
fn tune_socket(stream: &TcpStream) {
    if let Err(e) = apply_socket_options(stream) {
        warn!(?e, "socket tuning failed");
    }
}

fn apply_socket_options(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;

    let sock = socket2::SockRef::from(stream);

    let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(5));
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    let keepalive = keepalive
        .with_interval(Duration::from_secs(1))
        .with_retries(3);
    sock.set_tcp_keepalive(&keepalive)?;

    sock.set_recv_buffer_size(SOCKET_BUFFER_BYTES)?;
    sock.set_send_buffer_size(SOCKET_BUFFER_BYTES)?;

    #[cfg(target_os = "linux")]
    sock.set_quickack(true)?;

    Ok(())
}

/// Read one length-prefixed message. `Ok(None)` means the peer closed.
async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; protocol::FRAME_PREFIX_SIZE];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = protocol::frame_length(prefix);
    let mut payload = vec![0u8; len];
    if len > 0 {
        match reader.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(payload))
}

/// Write one message as a length-prefixed frame.
async fn write_frame<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&protocol::frame(&message.pack())).await
}

async fn handle_connection(
    inner: Arc<Inner>,
    mut stream: TcpStream,
    addr: SocketAddr,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tune_socket(&stream);
    let client = addr.to_string();

    // HELLO phase with a hard deadline
    let hello_frame = match tokio::time::timeout(HELLO_TIMEOUT, read_frame(&mut stream)).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(_) | Err(_) => {
            inner.emit(Event::Disconnected {
                reason: DisconnectReason::HelloTimeout,
                client: Some(client),
            });
            return;
        }
    };

    let hello = match Message::parse(&hello_frame) {
        Ok(Message::Hello(hello)) => hello,
        _ => {
            inner.emit(Event::Disconnected {
                reason: DisconnectReason::InvalidHello,
                client: Some(client),
            });
            return;
        }
    };

    // Check exclusivity, version, and code under one lock so concurrent
    // HELLOs cannot both install a session
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    let rejection = {
        let mut guard = inner.session_lock();
        if guard.is_some() {
            Some((AckStatus::Busy, RejectReason::Busy, None))
        } else if !protocol::is_version_supported(hello.version) {
            Some((
                AckStatus::VersionMismatch,
                RejectReason::VersionMismatch,
                Some(hello.version),
            ))
        } else if hello.code != inner.config.code {
            Some((AckStatus::BadCode, RejectReason::BadCode, None))
        } else {
            *guard = Some(SessionState {
                addr,
                session_id: hello.session_id,
                authenticated: true,
                config: inner.config.initial_config.clone(),
                outbound: outbound_tx.clone(),
            });
            None
        }
    };

    if let Some((status, reason, client_version)) = rejection {
        let _ = write_frame(&mut stream, &Message::Ack(Ack::new(status))).await;
        inner.emit(Event::SessionRejected {
            client,
            reason,
            client_version,
        });
        return;
    }

    let (mut read_half, write_half) = stream.into_split();
    let writer_task = tokio::spawn(writer_loop(write_half, outbound_rx));

    let _ = outbound_tx.send(Message::Ack(Ack::new(AckStatus::Ok))).await;
    let initial_config = inner.config.initial_config.clone();
    let _ = outbound_tx
        .send(Message::Config(ConfigMsg {
            config: initial_config,
        }))
        .await;

    inner.emit(Event::Connected {
        client: client.clone(),
        session_id: hello.session_id,
    });

    // Message loop
    let mut shutting_down = false;
    loop {
        tokio::select! {
            frame = read_frame(&mut read_half) => {
                match frame {
                    Ok(Some(buf)) => {
                        if dispatch(&inner, &buf, hello.session_id).is_break() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(?e, "session read error");
                        break;
                    }
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    // The session stays installed; close_session sends BYE
                    // and announces the shutdown
                    shutting_down = true;
                    break;
                }
            }
        }
    }

    if !shutting_down {
        // Remove the session if it is still ours and announce the end
        let ours = {
            let mut guard = inner.session_lock();
            let ours = guard
                .as_ref()
                .is_some_and(|s| s.addr == addr && s.session_id == hello.session_id);
            if ours {
                *guard = None;
            }
            ours
        };
        if ours {
            inner.emit(Event::Disconnected {
                reason: DisconnectReason::ConnectionClosed,
                client: Some(client),
            });
        }
    }

    drop(outbound_tx);
    let _ = writer_task.await;
}

/// Route one in-session message. `Break` ends the session cleanly.
fn dispatch(inner: &Inner, buf: &[u8], session_id: u32) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    let message = match Message::parse(buf) {
        Ok(message) => message,
        Err(e) => {
            // Malformed data from an authenticated peer is reported, not
            // fatal
            inner.emit(Event::Error {
                message: format!("Malformed message: {e}"),
            });
            return ControlFlow::Continue(());
        }
    };

    match message {
        Message::Pose(pose) => {
            inner.emit(Event::pose(pose.to_pose().into()));
        }
        Message::Cmd(cmd) => {
            let name = match cmd.cmd_type {
                protocol::CmdType::Recording => CommandName::Recording,
                protocol::CmdType::KeepRecording => CommandName::KeepRecording,
            };
            inner.emit(Event::Command {
                name,
                value: cmd.value != 0,
            });
        }
        Message::Bye(bye) => {
            if bye.session_id == session_id {
                return ControlFlow::Break(());
            }
            debug!(
                got = bye.session_id,
                expected = session_id,
                "ignoring BYE with mismatched session id"
            );
        }
        other => {
            debug!(?other, "ignoring unexpected message type in session");
        }
    }
    ControlFlow::Continue(())
}

async fn writer_loop(mut write_half: OwnedWriteHalf, mut outbound_rx: mpsc::Receiver<Message>) {
    while let Some(message) = outbound_rx.recv().await {
        if let Err(e) = write_frame(&mut write_half, &message).await {
            debug!(?e, "session write failed");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
