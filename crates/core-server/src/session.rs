//! One reliable-channel session: read fixed frames, dispatch, tear down.
//!
//! A session joins at most one room (its LOGIN). Layer operations are only
//! honored when the frame addresses that room's canvas; anything else is a
//! logged no-op, mirroring the protocol's silent-discard posture. The
//! stream stays aligned no matter what: unknown frame types consume a full
//! record, and a LAYER_SYNC always consumes its bitmap payload even when
//! the operation itself is rejected.

use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
use std::sync::Arc;

use core_canvas::{ConnId, Room, TcpSink, activate_room};
use core_pixel::LAYER_BYTES;
use core_proto::{Frame, MsgType, ProtoError};
use tracing::{debug, info, warn};

use crate::Server;

enum LoopAction {
    Continue,
    Stop,
}

struct Session {
    server: Arc<Server>,
    conn: ConnId,
    room: Option<Arc<Room>>,
}

pub(crate) fn run_session(server: Arc<Server>, stream: TcpStream, conn: ConnId) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(target: "session", conn, peer = %peer, "session open");

    let mut session = Session {
        server,
        conn,
        room: None,
    };
    if let Err(e) = session.read_loop(&stream) {
        debug!(target: "session", conn, error = %e, "session stream ended");
    }
    if let Some(room) = session.room.take() {
        room.leave(conn);
    }
    let _ = stream.shutdown(Shutdown::Both);
    info!(target: "session", conn, "session closed");
}

impl Session {
    fn read_loop(&mut self, stream: &TcpStream) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        loop {
            match Frame::read_from(&mut reader) {
                Ok(frame) => match self.dispatch(stream, &mut reader, frame)? {
                    LoopAction::Continue => {}
                    LoopAction::Stop => return Ok(()),
                },
                Err(ProtoError::Io(e)) => return Err(e),
                Err(e) => {
                    // Unknown type: the record was fully consumed, keep going.
                    debug!(target: "session", conn = self.conn, error = %e, "frame skipped");
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        stream: &TcpStream,
        reader: &mut BufReader<TcpStream>,
        frame: Frame,
    ) -> std::io::Result<LoopAction> {
        match frame.msg_type {
            MsgType::Login => self.handle_login(stream, &frame)?,
            MsgType::Logout => return Ok(LoopAction::Stop),
            MsgType::Save => {
                // A full queue means a save is already pending.
                let _ = self.server.save_tx().try_send(core_persist::SaveSignal::Nudge);
            }
            MsgType::Signature => {
                if let Some(room) = self.addressed_room(&frame) {
                    room.set_signature(self.conn, &frame);
                }
            }
            MsgType::LayerAdd => {
                if let Some(room) = self.addressed_room(&frame) {
                    room.add_layer(frame.layer_id);
                }
            }
            MsgType::LayerDel => {
                if let Some(room) = self.addressed_room(&frame) {
                    room.delete_layer(frame.layer_id);
                }
            }
            MsgType::LayerSync => {
                // The bitmap follows on the stream regardless of whether the
                // operation is honored; consume it to stay frame-aligned.
                let mut bitmap = vec![0u8; LAYER_BYTES];
                reader.read_exact(&mut bitmap)?;
                if let Some(room) = self.addressed_room(&frame) {
                    room.replace_layer(self.conn, &frame, &bitmap);
                }
            }
            MsgType::LayerReorder => {
                if let Some(room) = self.addressed_room(&frame) {
                    room.reorder_layer(&frame);
                }
            }
            MsgType::LayerMove => {
                if let Some(room) = self.addressed_room(&frame) {
                    room.translate_layer(self.conn, &frame);
                }
            }
            MsgType::LayerSelect => {
                if let Some(room) = self.addressed_room(&frame) {
                    room.relay_to_others(self.conn, &frame);
                }
            }
            MsgType::Welcome
            | MsgType::CanvasData
            | MsgType::Draw
            | MsgType::Cursor
            | MsgType::Line
            | MsgType::Error => {
                debug!(
                    target: "session",
                    conn = self.conn,
                    msg = ?frame.msg_type,
                    "ignoring frame not valid from a client"
                );
            }
        }
        Ok(LoopAction::Continue)
    }

    /// The session's joined room, provided the frame addresses its canvas.
    fn addressed_room(&self, frame: &Frame) -> Option<&Arc<Room>> {
        let room = self.room.as_ref()?;
        if room.canvas_id() != frame.canvas_id {
            debug!(
                target: "session",
                conn = self.conn,
                joined = room.canvas_id(),
                addressed = frame.canvas_id,
                "frame addresses a canvas this session is not in"
            );
            return None;
        }
        Some(room)
    }

    fn handle_login(&mut self, stream: &TcpStream, frame: &Frame) -> std::io::Result<()> {
        if self.room.is_some() {
            debug!(target: "session", conn = self.conn, "duplicate login ignored");
            return Ok(());
        }
        let canvas_id = frame.canvas_id;
        let room = self.server.registry().get_or_create(canvas_id);

        if !room.is_active() {
            let udp_addr = (
                self.server.config().bind_addr(),
                self.server.config().udp_port(canvas_id),
            );
            let activated = UdpSocket::bind(udp_addr)
                .and_then(|socket| activate_room(&room, socket, Arc::clone(self.server.brushes())));
            // A concurrent login may have won the bind; only refuse when the
            // room really stayed inactive.
            if let Err(e) = activated
                && !room.is_active()
            {
                warn!(
                    target: "session",
                    conn = self.conn,
                    canvas = canvas_id,
                    error = %e,
                    "unreliable socket unavailable; login refused"
                );
                let error = Frame::new(MsgType::Error, canvas_id);
                (&mut &*stream).write_all(&error.to_bytes())?;
                return Ok(());
            }
        }

        let name = String::from_utf8_lossy(frame.payload()).into_owned();
        let sink = TcpSink::new(stream.try_clone()?);
        match room.join(self.conn, &name, Box::new(sink)) {
            Some(outcome) => {
                info!(
                    target: "session",
                    conn = self.conn,
                    canvas = canvas_id,
                    uid = outcome.room_uid,
                    "login complete"
                );
                self.room = Some(room);
            }
            None => {
                let error = Frame::new(MsgType::Error, canvas_id);
                (&mut &*stream).write_all(&error.to_bytes())?;
            }
        }
        Ok(())
    }
}
