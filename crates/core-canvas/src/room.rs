//! The server-side room: one canvas's layers, users, subscribers, and
//! unreliable peers behind a single mutex.
//!
//! Every public operation is atomic under that mutex, and the broadcast
//! that echoes a mutation is emitted inside the same critical section, so a
//! subscriber can never observe a mutation before its echo. Broadcast
//! targets follow the protocol: layer add/del/reorder and signatures echo
//! to every subscriber (senders apply on echo, giving all clients the same
//! server-ordered view); layer sync/move go to the *other* subscribers
//! (the sender already applied locally); datagrams fan out to every
//! unreliable peer except the sending endpoint.

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;

use byteorder::{ByteOrder, LE};
use core_brush::BrushCatalog;
use core_pixel::LAYER_BYTES;
use core_proto::{Datagram, Frame, MsgType, SIGNATURE_LEN, write_welcome_bulk};
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::layer::Layer;
use crate::sink::ReliableSink;
use crate::stroke::apply_datagram_to_layers;

/// Hard ceiling on the layer stack, paper included.
pub const MAX_LAYERS: usize = 15;
/// Display names are truncated to this many bytes (on a grapheme boundary).
pub const MAX_NAME_BYTES: usize = 31;

/// Opaque reliable-connection handle, allocated by the acceptor.
pub type ConnId = u64;

pub struct UserRecord {
    pub name: String,
    pub room_uid: u8,
    pub signature: Option<Box<[u8; SIGNATURE_LEN]>>,
}

/// What a successful join hands back to the session handler.
#[derive(Debug, Clone, Copy)]
pub struct JoinOutcome {
    pub room_uid: u8,
    pub layer_count: u8,
}

struct RoomState {
    layers: Vec<Layer>,
    users: HashMap<ConnId, UserRecord>,
    subscribers: HashMap<ConnId, Box<dyn ReliableSink>>,
    peers: HashSet<SocketAddr>,
    dirty: bool,
}

pub struct Room {
    canvas_id: u8,
    state: Mutex<RoomState>,
    /// Set once at activation, before the worker is observable.
    socket: OnceLock<Arc<UdpSocket>>,
    active: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Room {
    /// A freshly created room: paper plus one drawable layer, no users.
    pub fn new(canvas_id: u8) -> Self {
        Self {
            canvas_id,
            state: Mutex::new(RoomState {
                layers: vec![Layer::paper(), Layer::transparent()],
                users: HashMap::new(),
                subscribers: HashMap::new(),
                peers: HashSet::new(),
                dirty: true,
            }),
            socket: OnceLock::new(),
            active: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn canvas_id(&self) -> u8 {
        self.canvas_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    /// Stop the worker loop; it exits within its receive timeout. Not part
    /// of the client-visible protocol.
    pub fn deactivate(&self) {
        self.set_active(false);
    }

    pub(crate) fn set_socket(&self, socket: Arc<UdpSocket>) -> bool {
        self.socket.set(socket).is_ok()
    }

    pub(crate) fn store_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().expect("room worker slot poisoned") = Some(handle);
    }

    /// Whether a worker thread has ever been attached to this room.
    pub fn has_worker(&self) -> bool {
        self.worker.lock().expect("room worker slot poisoned").is_some()
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().expect("room state poisoned")
    }

    // -- membership ---------------------------------------------------------

    /// Add a user, assign the smallest free uid, and stream the WELCOME
    /// reply (header, bulk layer download, then the other users' stored
    /// signatures) through the new subscriber's sink. Returns `None` when
    /// the uid space is exhausted.
    pub fn join(&self, conn: ConnId, name: &str, sink: Box<dyn ReliableSink>) -> Option<JoinOutcome> {
        let mut state = self.lock();
        let used: HashSet<u8> = state.users.values().map(|u| u.room_uid).collect();
        let Some(room_uid) = (1..=u8::MAX).find(|c| !used.contains(c)) else {
            warn!(target: "room", canvas = self.canvas_id, "join rejected: uid space exhausted");
            return None;
        };
        let name = truncate_name(name);
        let layer_count = state.layers.len() as u8;

        let mut welcome = Frame::new(MsgType::Welcome, self.canvas_id);
        welcome.layer_count = layer_count;
        welcome.user_id = room_uid;
        if let Err(e) = sink.send(&welcome.to_bytes()) {
            debug!(target: "room", canvas = self.canvas_id, error = %e, "welcome header send failed");
        }

        let mut bulk = Vec::with_capacity(4 + (layer_count as usize - 1) * LAYER_BYTES);
        let drawables = state.layers.iter().skip(1).map(|l| l.as_bytes());
        // Writing into a Vec cannot fail.
        let _ = write_welcome_bulk(&mut bulk, layer_count as u32, drawables);
        if let Err(e) = sink.send(&bulk) {
            debug!(target: "room", canvas = self.canvas_id, error = %e, "welcome bulk send failed");
        }

        for user in state.users.values() {
            if let Some(sig) = &user.signature {
                let mut frame = Frame::with_payload(MsgType::Signature, self.canvas_id, &sig[..]);
                frame.user_id = user.room_uid;
                let _ = sink.send(&frame.to_bytes());
            }
        }

        state.users.insert(
            conn,
            UserRecord {
                name: name.clone(),
                room_uid,
                signature: None,
            },
        );
        state.subscribers.insert(conn, sink);
        info!(
            target: "room",
            canvas = self.canvas_id,
            uid = room_uid,
            name = %name,
            users = state.users.len(),
            "user joined"
        );
        Some(JoinOutcome {
            room_uid,
            layer_count,
        })
    }

    /// Drop a user and its subscriber sink. The unreliable peer set is left
    /// alone; peers are only ever added.
    pub fn leave(&self, conn: ConnId) {
        let mut state = self.lock();
        let record = state.users.remove(&conn);
        state.subscribers.remove(&conn);
        if let Some(user) = record {
            info!(
                target: "room",
                canvas = self.canvas_id,
                uid = user.room_uid,
                name = %user.name,
                "user left"
            );
        }
    }

    // -- layer operations ---------------------------------------------------

    /// Insert a fresh transparent layer at `at` (append when `at` is zero
    /// or past the end) and echo LAYER_ADD to every subscriber. No-op at
    /// capacity. Returns the insertion index and the new layer count.
    pub fn add_layer(&self, at: u8) -> Option<(u8, u8)> {
        let mut state = self.lock();
        let len = state.layers.len();
        if len >= MAX_LAYERS {
            debug!(target: "room", canvas = self.canvas_id, "layer add ignored: at capacity");
            return None;
        }
        let at = at as usize;
        let index = if at == 0 || at >= len { len } else { at };
        state.layers.insert(index, Layer::transparent());
        state.dirty = true;
        let count = state.layers.len() as u8;

        let mut frame = Frame::new(MsgType::LayerAdd, self.canvas_id);
        frame.layer_count = count;
        frame.layer_id = index as u8;
        broadcast(&state, &frame.to_bytes(), None);
        Some((index as u8, count))
    }

    /// Remove drawable layer `index` and echo LAYER_DEL to every
    /// subscriber. No-op for the paper layer, out-of-range indices, or when
    /// only one drawable remains.
    pub fn delete_layer(&self, index: u8) -> bool {
        let mut state = self.lock();
        let i = index as usize;
        let len = state.layers.len();
        if i < 1 || i >= len || len <= 2 {
            debug!(
                target: "room",
                canvas = self.canvas_id,
                index,
                layers = len,
                "layer delete ignored"
            );
            return false;
        }
        state.layers.remove(i);
        state.dirty = true;
        let count = state.layers.len() as u8;

        let mut frame = Frame::new(MsgType::LayerDel, self.canvas_id);
        frame.layer_count = count;
        frame.layer_id = index;
        broadcast(&state, &frame.to_bytes(), None);
        true
    }

    /// Move a drawable layer by rotating the span between the two indices,
    /// then echo the caller's LAYER_REORDER header to every subscriber.
    pub fn reorder_layer(&self, frame: &Frame) -> bool {
        let payload = frame.payload();
        if payload.len() < 2 {
            return false;
        }
        let (from, to) = (payload[0] as usize, payload[1] as usize);
        let mut state = self.lock();
        let len = state.layers.len();
        if from < 1 || from >= len || to < 1 || to >= len || from == to {
            debug!(target: "room", canvas = self.canvas_id, from, to, "layer reorder ignored");
            return false;
        }
        if from < to {
            state.layers[from..=to].rotate_left(1);
        } else {
            state.layers[to..=from].rotate_right(1);
        }
        state.dirty = true;
        broadcast(&state, &frame.to_bytes(), None);
        true
    }

    /// Overwrite a drawable layer's bitmap and forward the caller's
    /// LAYER_SYNC header plus payload to the other subscribers.
    pub fn replace_layer(&self, from: ConnId, frame: &Frame, bytes: &[u8]) -> bool {
        let i = frame.layer_id as usize;
        let mut state = self.lock();
        if i < 1 || i >= state.layers.len() {
            debug!(target: "room", canvas = self.canvas_id, index = i, "layer sync ignored");
            return false;
        }
        if !state.layers[i].replace(bytes) {
            debug!(
                target: "room",
                canvas = self.canvas_id,
                len = bytes.len(),
                "layer sync payload has the wrong length"
            );
            return false;
        }
        state.dirty = true;
        let header = frame.to_bytes();
        for (id, sink) in &state.subscribers {
            if *id == from {
                continue;
            }
            if sink.send(&header).and_then(|()| sink.send(bytes)).is_err() {
                debug!(target: "room", canvas = self.canvas_id, conn = id, "layer sync forward failed");
            }
        }
        true
    }

    /// Translate a drawable layer by the `(dx, dy)` carried in the caller's
    /// LAYER_MOVE payload, then forward the header to the other
    /// subscribers (the sender already applied the move locally).
    pub fn translate_layer(&self, from: ConnId, frame: &Frame) -> bool {
        let payload = frame.payload();
        if payload.len() < 8 {
            return false;
        }
        let dx = LE::read_i32(&payload[0..4]);
        let dy = LE::read_i32(&payload[4..8]);
        let i = frame.layer_id as usize;
        let mut state = self.lock();
        if i < 1 || i >= state.layers.len() {
            debug!(target: "room", canvas = self.canvas_id, index = i, "layer move ignored");
            return false;
        }
        state.layers[i].translate(dx, dy);
        state.dirty = true;
        broadcast(&state, &frame.to_bytes(), Some(from));
        true
    }

    /// Forward a frame verbatim to every subscriber but the sender. Used
    /// for LAYER_SELECT presence updates, which carry no server state.
    pub fn relay_to_others(&self, from: ConnId, frame: &Frame) {
        let state = self.lock();
        broadcast(&state, &frame.to_bytes(), Some(from));
    }

    /// Store the caller's signature and echo it to every subscriber with
    /// the caller's uid stamped in. The payload must be exactly
    /// [`SIGNATURE_LEN`] bytes.
    pub fn set_signature(&self, conn: ConnId, frame: &Frame) -> bool {
        if frame.data_len as usize != SIGNATURE_LEN {
            debug!(
                target: "room",
                canvas = self.canvas_id,
                len = frame.data_len,
                "signature with wrong payload length ignored"
            );
            return false;
        }
        let mut state = self.lock();
        let Some(user) = state.users.get_mut(&conn) else {
            return false;
        };
        let mut sig = Box::new([0u8; SIGNATURE_LEN]);
        sig.copy_from_slice(&frame.data);
        user.signature = Some(sig);
        let uid = user.room_uid;

        let mut echo = Frame::with_payload(MsgType::Signature, self.canvas_id, &frame.data);
        echo.user_id = uid;
        broadcast(&state, &echo.to_bytes(), None);
        true
    }

    // -- unreliable channel -------------------------------------------------

    /// Handle one raw datagram from `sender`: discover the peer, apply
    /// DRAW/LINE strokes to the addressed layer, and rebroadcast the packet
    /// to every peer except the sender. Malformed packets are dropped.
    pub fn apply_datagram(&self, catalog: &BrushCatalog, raw: &[u8], sender: SocketAddr) {
        let dg = match Datagram::decode(raw) {
            Ok(dg) => dg,
            Err(e) => {
                debug!(target: "net.udp", canvas = self.canvas_id, error = %e, "datagram dropped");
                return;
            }
        };
        let mut state = self.lock();
        if state.peers.insert(sender) {
            info!(target: "net.udp", canvas = self.canvas_id, peer = %sender, "unreliable peer discovered");
        }
        if apply_datagram_to_layers(&mut state.layers, catalog, &dg) {
            state.dirty = true;
        }
        if let Some(socket) = self.socket.get() {
            for peer in &state.peers {
                if *peer == sender {
                    continue;
                }
                if let Err(e) = socket.send_to(raw, peer) {
                    debug!(target: "net.udp", canvas = self.canvas_id, peer = %peer, error = %e, "rebroadcast failed");
                }
            }
        }
    }

    // -- persistence hooks --------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn mark_dirty(&self) {
        self.lock().dirty = true;
    }

    pub fn mark_clean(&self) {
        self.lock().dirty = false;
    }

    /// Collect `(index, blob)` for every drawable layer, reusing each
    /// layer's cached encoded form when it is clean and invoking `encode`
    /// (which also warms the cache) only for dirty layers.
    pub fn encode_drawables_with(&self, mut encode: impl FnMut(&[u8]) -> String) -> Vec<(u8, String)> {
        let mut state = self.lock();
        let mut out = Vec::with_capacity(state.layers.len().saturating_sub(1));
        for (i, layer) in state.layers.iter_mut().enumerate().skip(1) {
            let blob = match layer.cached() {
                Some(cached) => cached.to_string(),
                None => {
                    let blob = encode(layer.as_bytes());
                    layer.mark_clean(blob.clone());
                    blob
                }
            };
            out.push((i as u8, blob));
        }
        out
    }

    /// Replace the drawable stack from persisted `(blob, pixels)` pairs in
    /// index order. A `Some` blob decoded exactly and becomes the layer's
    /// warm cache; `None` marks a layer that was clipped during decode and
    /// must be re-encoded by the next save. Entries past the layer ceiling
    /// are dropped.
    pub fn load_drawables(&self, entries: Vec<(Option<String>, Vec<u8>)>) {
        let mut state = self.lock();
        let mut layers = Vec::with_capacity(entries.len() + 1);
        layers.push(Layer::paper());
        for (blob, pixels) in entries.into_iter().take(MAX_LAYERS - 1) {
            layers.push(match blob {
                Some(blob) => Layer::restored(pixels, blob),
                None => Layer::from_pixels(pixels),
            });
        }
        if layers.len() < 2 {
            layers.push(Layer::transparent());
        }
        state.dirty = layers.iter().skip(1).any(|l| l.is_dirty());
        state.layers = layers;
    }

    // -- inspection ---------------------------------------------------------

    pub fn layer_count(&self) -> u8 {
        self.lock().layers.len() as u8
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn uid_of(&self, conn: ConnId) -> Option<u8> {
        self.lock().users.get(&conn).map(|u| u.room_uid)
    }

    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    /// Read back one pixel of one layer (test and tooling aid).
    pub fn layer_pixel(&self, layer: usize, x: i32, y: i32) -> Option<core_pixel::Pixel> {
        let state = self.lock();
        state.layers.get(layer).and_then(|l| l.pixel(x, y))
    }
}

/// Send `bytes` to every subscriber except `except`, swallowing per-target
/// failures; the failing peer's own session handler notices the close.
fn broadcast(state: &RoomState, bytes: &[u8], except: Option<ConnId>) {
    for (id, sink) in &state.subscribers {
        if Some(*id) == except {
            continue;
        }
        if let Err(e) = sink.send(bytes) {
            debug!(target: "room", conn = id, error = %e, "broadcast send failed");
        }
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }
    let mut out = String::new();
    for grapheme in name.graphemes(true) {
        if out.len() + grapheme.len() > MAX_NAME_BYTES {
            break;
        }
        out.push_str(grapheme);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use core_pixel::Pixel;
    use core_proto::FRAME_LEN;

    fn frame_from(bytes: &[u8]) -> Frame {
        let raw: [u8; FRAME_LEN] = bytes[..FRAME_LEN].try_into().unwrap();
        Frame::from_bytes(&raw).unwrap()
    }

    fn join(room: &Room, conn: ConnId, name: &str) -> (RecordingSink, JoinOutcome) {
        let sink = RecordingSink::new();
        let outcome = room.join(conn, name, Box::new(sink.clone())).unwrap();
        (sink, outcome)
    }

    #[test]
    fn uids_are_smallest_free_and_reused() {
        let room = Room::new(0);
        let (_, a) = join(&room, 1, "a");
        let (_, b) = join(&room, 2, "b");
        let (_, c) = join(&room, 3, "c");
        assert_eq!((a.room_uid, b.room_uid, c.room_uid), (1, 2, 3));

        room.leave(2);
        let (_, d) = join(&room, 4, "d");
        assert_eq!(d.room_uid, 2);
    }

    #[test]
    fn welcome_carries_count_uid_and_bulk() {
        let room = Room::new(5);
        let (sink, outcome) = join(&room, 1, "painter");
        let sent = sink.sent();
        assert!(sent.len() >= 2);

        let welcome = frame_from(&sent[0]);
        assert_eq!(welcome.msg_type, MsgType::Welcome);
        assert_eq!(welcome.canvas_id, 5);
        assert_eq!(welcome.layer_count, 2);
        assert_eq!(welcome.user_id, outcome.room_uid);

        // Bulk: u32 count then one drawable bitmap.
        let bulk = &sent[1];
        assert_eq!(&bulk[..4], &2u32.to_le_bytes());
        assert_eq!(bulk.len(), 4 + LAYER_BYTES);
    }

    #[test]
    fn joiner_receives_stored_signatures_of_others() {
        let room = Room::new(0);
        let (_, first) = join(&room, 1, "first");
        let mut sig = Frame::new(MsgType::Signature, 0);
        sig.data = [0xAB; 256];
        sig.data_len = 256;
        assert!(room.set_signature(1, &sig));

        let (sink, _) = join(&room, 2, "second");
        let sent = sink.sent();
        // welcome header, bulk, then the stored signature.
        let forwarded = frame_from(&sent[2]);
        assert_eq!(forwarded.msg_type, MsgType::Signature);
        assert_eq!(forwarded.user_id, first.room_uid);
        assert_eq!(forwarded.payload(), &[0xAB; 256][..]);
    }

    #[test]
    fn signature_echoes_to_everyone_including_sender() {
        let room = Room::new(0);
        let (sink_a, a) = join(&room, 1, "a");
        let (sink_b, _) = join(&room, 2, "b");

        let mut sig = Frame::new(MsgType::Signature, 0);
        sig.data = [0x5A; 256];
        sig.data_len = 256;
        assert!(room.set_signature(1, &sig));

        for sink in [&sink_a, &sink_b] {
            let last = sink.sent().last().unwrap().clone();
            let echo = frame_from(&last);
            assert_eq!(echo.msg_type, MsgType::Signature);
            assert_eq!(echo.user_id, a.room_uid);
            assert_eq!(echo.data_len, 256);
            assert_eq!(echo.payload(), &[0x5A; 256][..]);
        }
    }

    #[test]
    fn short_signature_is_ignored() {
        let room = Room::new(0);
        let (sink, _) = join(&room, 1, "a");
        let before = sink.sent().len();
        let sig = Frame::with_payload(MsgType::Signature, 0, &[1, 2, 3]);
        assert!(!room.set_signature(1, &sig));
        assert_eq!(sink.sent().len(), before);
    }

    #[test]
    fn add_layer_appends_and_echoes() {
        let room = Room::new(0);
        let (sink, _) = join(&room, 1, "a");
        let (index, count) = room.add_layer(0).unwrap();
        assert_eq!((index, count), (2, 3));

        let last = sink.sent().last().unwrap().clone();
        let echo = frame_from(&last);
        assert_eq!(echo.msg_type, MsgType::LayerAdd);
        assert_eq!(echo.layer_count, 3);
        assert_eq!(echo.layer_id, 2);
    }

    #[test]
    fn add_layer_inserts_mid_stack() {
        let room = Room::new(0);
        room.add_layer(0).unwrap();
        let (index, count) = room.add_layer(1).unwrap();
        assert_eq!((index, count), (1, 4));
    }

    #[test]
    fn layer_cap_is_a_silent_no_op() {
        let room = Room::new(0);
        let (sink, _) = join(&room, 1, "a");
        while room.layer_count() < MAX_LAYERS as u8 {
            room.add_layer(0).unwrap();
        }
        let sent_before = sink.sent().len();
        assert!(room.add_layer(0).is_none());
        assert_eq!(room.layer_count(), MAX_LAYERS as u8);
        assert_eq!(sink.sent().len(), sent_before, "no broadcast on no-op");
    }

    #[test]
    fn delete_guards_paper_and_last_drawable() {
        let room = Room::new(0);
        assert!(!room.delete_layer(0), "paper never deletable");
        assert!(!room.delete_layer(1), "last drawable never deletable");
        room.add_layer(0).unwrap();
        assert!(room.delete_layer(2));
        assert_eq!(room.layer_count(), 2);
        assert!(!room.delete_layer(5));
    }

    #[test]
    fn reorder_rotates_the_span() {
        let room = Room::new(0);
        room.add_layer(0).unwrap(); // index 2
        room.add_layer(0).unwrap(); // index 3

        // Tag layer 1 so we can watch it travel.
        let tag = Pixel::new(9, 9, 9, 255);
        {
            let mut state = room.lock();
            state.layers[1].write(0, 0, tag, core_pixel::WriteMode::Replace);
        }

        let mut frame = Frame::with_payload(MsgType::LayerReorder, 0, &[1, 3]);
        frame.layer_id = 1;
        assert!(room.reorder_layer(&frame));
        assert_eq!(room.layer_pixel(3, 0, 0), Some(tag));
        assert_eq!(room.layer_pixel(1, 0, 0), Some(Pixel::TRANSPARENT));
    }

    #[test]
    fn reorder_rejects_paper_and_out_of_range() {
        let room = Room::new(0);
        room.add_layer(0).unwrap();
        let bad = Frame::with_payload(MsgType::LayerReorder, 0, &[0, 2]);
        assert!(!room.reorder_layer(&bad));
        let bad = Frame::with_payload(MsgType::LayerReorder, 0, &[1, 9]);
        assert!(!room.reorder_layer(&bad));
    }

    #[test]
    fn sync_replaces_and_forwards_to_others_only() {
        let room = Room::new(0);
        let (sink_a, _) = join(&room, 1, "a");
        let (sink_b, _) = join(&room, 2, "b");

        let bytes = vec![7u8; LAYER_BYTES];
        let mut frame = Frame::new(MsgType::LayerSync, 0);
        frame.layer_id = 1;
        let a_before = sink_a.sent().len();
        assert!(room.replace_layer(1, &frame, &bytes));

        assert_eq!(room.layer_pixel(1, 0, 0), Some(Pixel::new(7, 7, 7, 7)));
        assert_eq!(sink_a.sent().len(), a_before, "sender gets no echo");
        let b_sent = sink_b.sent();
        let header = frame_from(&b_sent[b_sent.len() - 2]);
        assert_eq!(header.msg_type, MsgType::LayerSync);
        assert_eq!(b_sent.last().unwrap().len(), LAYER_BYTES);
    }

    #[test]
    fn sync_with_wrong_length_is_ignored() {
        let room = Room::new(0);
        let mut frame = Frame::new(MsgType::LayerSync, 0);
        frame.layer_id = 1;
        assert!(!room.replace_layer(1, &frame, &[0u8; 64]));
    }

    #[test]
    fn move_translates_and_skips_sender() {
        let room = Room::new(0);
        let (sink_a, _) = join(&room, 1, "a");
        let (sink_b, _) = join(&room, 2, "b");

        {
            let mut state = room.lock();
            state.layers[1].write(4, 4, Pixel::WHITE, core_pixel::WriteMode::Replace);
        }

        let mut payload = [0u8; 8];
        LE::write_i32(&mut payload[0..4], 3);
        LE::write_i32(&mut payload[4..8], -2);
        let mut frame = Frame::with_payload(MsgType::LayerMove, 0, &payload);
        frame.layer_id = 1;

        let a_before = sink_a.sent().len();
        assert!(room.translate_layer(1, &frame));
        assert_eq!(room.layer_pixel(1, 7, 2), Some(Pixel::WHITE));
        assert_eq!(room.layer_pixel(1, 4, 4), Some(Pixel::TRANSPARENT));
        assert_eq!(sink_a.sent().len(), a_before);
        let echo = frame_from(sink_b.sent().last().unwrap());
        assert_eq!(echo.msg_type, MsgType::LayerMove);
    }

    #[test]
    fn subscriber_and_user_tables_share_keys() {
        let room = Room::new(0);
        join(&room, 1, "a");
        join(&room, 2, "b");
        room.leave(1);
        let state = room.lock();
        let users: HashSet<_> = state.users.keys().copied().collect();
        let sinks: HashSet<_> = state.subscribers.keys().copied().collect();
        assert_eq!(users, sinks);
    }

    #[test]
    fn long_names_are_truncated_on_grapheme_boundaries() {
        let room = Room::new(0);
        let long = "é".repeat(40); // 2 bytes per grapheme
        join(&room, 1, &long);
        let state = room.lock();
        let stored = &state.users[&1].name;
        assert!(stored.len() <= MAX_NAME_BYTES);
        assert_eq!(stored.len() % 2, 0, "never split a grapheme");
    }

    #[test]
    fn datagrams_apply_and_mark_dirty() {
        let room = Room::new(0);
        room.mark_clean();
        let catalog = BrushCatalog::standard();
        let dg = Datagram::draw(0, 1, 100, 100, 0, Pixel::new(0, 0, 0, 255), 5, 255);
        let sender: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        room.apply_datagram(&catalog, &dg.encode(), sender);

        assert_eq!(room.layer_pixel(1, 100, 100), Some(Pixel::new(0, 0, 0, 255)));
        assert!(room.is_dirty());
        assert_eq!(room.peer_count(), 1);
    }

    #[test]
    fn cursor_discovers_peer_without_painting() {
        let room = Room::new(0);
        room.mark_clean();
        let catalog = BrushCatalog::standard();
        let dg = Datagram::cursor(1, 1, 10, 10);
        let sender: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        room.apply_datagram(&catalog, &dg.encode(), sender);
        assert_eq!(room.peer_count(), 1);
        assert!(!room.is_dirty());
    }

    #[test]
    fn malformed_datagram_is_dropped() {
        let room = Room::new(0);
        let catalog = BrushCatalog::standard();
        let sender: SocketAddr = "127.0.0.1:4002".parse().unwrap();
        room.apply_datagram(&catalog, &[6u8; 5], sender);
        assert_eq!(room.peer_count(), 0, "peer discovery requires a valid record");
    }

    #[test]
    fn rebroadcast_reaches_other_peers_only() {
        let room = Room::new(0);
        let catalog = BrushCatalog::standard();
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        assert!(room.set_socket(Arc::new(server)));

        let peer_a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_b = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer_a
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        peer_b
            .set_read_timeout(Some(std::time::Duration::from_millis(200)))
            .unwrap();

        // A is discovered first, then B sends a stroke.
        let hello = Datagram::cursor(1, 1, 0, 0).encode();
        room.apply_datagram(&catalog, &hello, peer_a.local_addr().unwrap());

        let stroke = Datagram::draw(0, 1, 5, 5, 0, Pixel::new(1, 2, 3, 255), 3, 255).encode();
        room.apply_datagram(&catalog, &stroke, peer_b.local_addr().unwrap());

        let mut buf = [0u8; 64];
        let (n, _) = peer_a.recv_from(&mut buf).expect("peer A receives the stroke");
        assert_eq!(&buf[..n], &stroke[..]);
        // The sender must not hear its own packet (A's hello predates B).
        assert!(peer_b.recv_from(&mut buf).is_err());
    }

    #[test]
    fn encode_drawables_reuses_warm_caches() {
        let room = Room::new(0);
        let mut calls = 0;
        let first = room.encode_drawables_with(|_| {
            calls += 1;
            "blob".to_string()
        });
        assert_eq!(first.len(), 1);
        assert_eq!(calls, 1);

        let mut calls_again = 0;
        let second = room.encode_drawables_with(|_| {
            calls_again += 1;
            String::new()
        });
        assert_eq!(calls_again, 0, "clean layers never re-encode");
        assert_eq!(second, first);
    }

    #[test]
    fn load_drawables_restores_clean_state() {
        let room = Room::new(0);
        let pixels = vec![0u8; LAYER_BYTES];
        room.load_drawables(vec![
            (Some("one".to_string()), pixels.clone()),
            (Some("two".to_string()), pixels),
        ]);
        assert_eq!(room.layer_count(), 3);
        assert!(!room.is_dirty());
        let blobs = room.encode_drawables_with(|_| unreachable!("caches are warm"));
        assert_eq!(blobs[0].1, "one");
        assert_eq!(blobs[1].1, "two");
    }

    #[test]
    fn clipped_layers_load_dirty() {
        let room = Room::new(0);
        let pixels = vec![0u8; LAYER_BYTES];
        room.load_drawables(vec![(None, pixels)]);
        assert_eq!(room.layer_count(), 2);
        assert!(room.is_dirty(), "clipped layer forces a re-save");
    }
}
