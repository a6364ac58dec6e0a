//! UDP discovery beacon broadcaster.
//!
//! Every 500 ms a BEACON carrying `(tcp_port, name)` goes to the limited
//! broadcast address and to the directed broadcast of every IPv4 interface
//! enumerated at send time. This reaches WiFi, USB-tethering, and
//! internet-sharing bridge interfaces without an mDNS dependency.

use protocol::{Beacon, Message};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, trace};
use types::{Event, EventSink};

const BEACON_INTERVAL: Duration = Duration::from_millis(500);

/// Directed broadcast addresses of all IPv4 interfaces, deduplicated.
fn broadcast_addresses() -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();
    if let Ok(interfaces) = if_addrs::get_if_addrs() {
        for interface in interfaces {
            if let if_addrs::IfAddr::V4(v4) = interface.addr {
                if let Some(broadcast) = v4.broadcast {
                    if !addresses.contains(&broadcast) {
                        addresses.push(broadcast);
                    }
                }
            }
        }
    }
    addresses
}

pub(crate) async fn broadcast_loop(
    name: String,
    tcp_port: u16,
    beacon_port: u16,
    sink: EventSink,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            sink(Event::Error {
                message: format!("Beacon start failed: {e}"),
            });
            return;
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        sink(Event::Error {
            message: format!("Beacon start failed: {e}"),
        });
        return;
    }

    let payload = Message::Beacon(Beacon {
        tcp_port,
        name: name.clone(),
    })
    .pack();

    let initial: Vec<String> = broadcast_addresses()
        .into_iter()
        .map(|addr| addr.to_string())
        .chain(std::iter::once(Ipv4Addr::BROADCAST.to_string()))
        .collect();
    sink(Event::BeaconStarted {
        name,
        beacon_port,
        tcp_port,
        broadcast_addresses: initial,
    });

    let mut ticker = tokio::time::interval(BEACON_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Interfaces come and go (USB tethering), so enumerate on
                // every send
                for addr in broadcast_addresses() {
                    if let Err(e) = socket.send_to(&payload, (addr, beacon_port)).await {
                        trace!(?e, %addr, "beacon send failed");
                    }
                }
                if let Err(e) = socket
                    .send_to(&payload, (Ipv4Addr::BROADCAST, beacon_port))
                    .await
                {
                    trace!(?e, "limited broadcast send failed");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("beacon broadcaster stopping");
                    break;
                }
            }
        }
    }
}
