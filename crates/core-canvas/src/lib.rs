//! Canvas state: layers, rooms, the room registry, and the per-room
//! unreliable worker.
//!
//! A `Room` owns one canvas outright: its layer stack, its user table, its
//! reliable subscriber sinks, and its unreliable peer set, all behind a
//! single mutex. Session handlers and the room's datagram worker take the
//! same lock, so every reliable mutation and the broadcast that echoes it
//! form one atomic section. The only I/O performed under the lock is the
//! broadcast sends themselves, which are bounded by the subscriber/peer set
//! size and tolerate per-target failure silently.
//!
//! Invariants guarded here:
//! * layer index 0 is the opaque-white paper layer and is never removed;
//! * `2 ≤ layers.len() ≤ MAX_LAYERS`;
//! * every `room_uid` is unique within the room and drawn from `1..=255`,
//!   assigned as the smallest free value at join time;
//! * the subscriber set and the user table always share their key set;
//! * the room `dirty` flag rises whenever any layer mutates.

mod layer;
mod registry;
mod room;
mod sink;
mod stroke;
mod worker;

pub use layer::{Layer, composite};
pub use registry::RoomRegistry;
pub use room::{ConnId, JoinOutcome, MAX_LAYERS, Room, UserRecord};
pub use sink::{RecordingSink, ReliableSink, TcpSink};
pub use stroke::apply_datagram_to_layers;
pub use worker::{RECV_TIMEOUT, activate_room};
