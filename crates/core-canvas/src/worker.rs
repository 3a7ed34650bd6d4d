//! Per-room unreliable worker: a blocking receive loop on the room's UDP
//! socket.
//!
//! The socket and the active flag are established before the worker thread
//! is observable and never mutated afterwards; the loop polls the flag once
//! per receive timeout so it can wind down without a dedicated cancellation
//! channel.

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use core_brush::BrushCatalog;
use tracing::{info, warn};

use crate::room::Room;

/// Liveness timeout of the blocking receive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Move a room into the Active state: adopt the pre-bound socket and spawn
/// its worker thread. A room that is already Active keeps its first worker
/// and this call is a no-op.
pub fn activate_room(
    room: &Arc<Room>,
    socket: UdpSocket,
    catalog: Arc<BrushCatalog>,
) -> io::Result<()> {
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    let socket = Arc::new(socket);
    if !room.set_socket(socket.clone()) {
        return Ok(());
    }
    room.set_active(true);
    let worker_room = Arc::clone(room);
    let handle = thread::Builder::new()
        .name(format!("room-{}", room.canvas_id()))
        .spawn(move || recv_loop(worker_room, socket, catalog))
        .inspect_err(|_| room.set_active(false))?;
    room.store_worker(handle);
    Ok(())
}

fn recv_loop(room: Arc<Room>, socket: Arc<UdpSocket>, catalog: Arc<BrushCatalog>) {
    let canvas = room.canvas_id();
    info!(target: "net.udp", canvas, addr = ?socket.local_addr().ok(), "room worker started");
    let mut buf = [0u8; 512];
    while room.is_active() {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => room.apply_datagram(&catalog, &buf[..len], from),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => warn!(target: "net.udp", canvas, error = %e, "receive failed"),
        }
    }
    info!(target: "net.udp", canvas, "room worker stopped");
}
