//! Headless protocol client.
//!
//! A `Client` is the message-level half of a painting shell: it logs in
//! over the reliable channel, downloads the canvas, mirrors every layer
//! operation it hears, and applies stroke datagrams through the same
//! stroke path as the server (`core_canvas::apply_datagram_to_layers`), so
//! its local preview and the server's applied state agree pixel-for-pixel.
//! Everything a graphical shell would add (input devices, widgets, undo)
//! sits above this type and is out of scope here.
//!
//! The client owns the server-assigned room uid from WELCOME and uses it to
//! discard its own SIGNATURE echo.

use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use byteorder::{ByteOrder, LE};
use core_brush::BrushCatalog;
use core_canvas::{Layer, apply_datagram_to_layers, composite};
use core_pixel::{LAYER_BYTES, Pixel, stroke_angle};
use core_proto::{
    Datagram, Frame, MsgType, ProtoError, SIGNATURE_LEN, read_welcome_layer_count, udp_port_for,
};
use tracing::{debug, info};

pub struct Client {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
    udp: UdpSocket,
    server_udp: SocketAddr,
    canvas_id: u8,
    room_uid: u8,
    catalog: BrushCatalog,
    layers: Vec<Layer>,
    signatures: HashMap<u8, Box<[u8; SIGNATURE_LEN]>>,
}

impl Client {
    /// Connect, log in to `canvas_id` under `name`, and download the
    /// canvas. Fails if the server answers the login with ERROR.
    pub fn connect(host: &str, tcp_port: u16, canvas_id: u8, name: &str) -> Result<Self> {
        let stream = TcpStream::connect((host, tcp_port))
            .with_context(|| format!("connect reliable channel {host}:{tcp_port}"))?;
        let mut reader = BufReader::new(stream.try_clone()?);

        let login = Frame::with_payload(
            MsgType::Login,
            canvas_id,
            &name.as_bytes()[..name.len().min(core_proto::FRAME_DATA_CAP)],
        );
        (&stream).write_all(&login.to_bytes())?;

        let reply = Frame::read_from(&mut reader).map_err(|e| anyhow!("login reply: {e}"))?;
        match reply.msg_type {
            MsgType::Welcome => {}
            MsgType::Error => bail!("login refused for canvas {canvas_id}"),
            other => bail!("unexpected login reply {other:?}"),
        }
        let room_uid = reply.user_id;

        let bulk_count = read_welcome_layer_count(&mut reader)?;
        let mut layers = Vec::with_capacity(bulk_count as usize);
        layers.push(Layer::paper());
        for _ in 1..bulk_count {
            let mut bitmap = vec![0u8; LAYER_BYTES];
            reader.read_exact(&mut bitmap)?;
            layers.push(Layer::from_pixels(bitmap));
        }

        let udp = UdpSocket::bind(("0.0.0.0", 0)).context("bind local unreliable socket")?;
        let server_udp = (host, udp_port_for(tcp_port, canvas_id))
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow!("no address for the unreliable channel"))?;

        info!(
            target: "client",
            canvas = canvas_id,
            uid = room_uid,
            layers = layers.len(),
            "logged in"
        );
        Ok(Self {
            reader,
            stream,
            udp,
            server_udp,
            canvas_id,
            room_uid,
            catalog: BrushCatalog::standard(),
            layers,
            signatures: HashMap::new(),
        })
    }

    pub fn canvas_id(&self) -> u8 {
        self.canvas_id
    }

    pub fn room_uid(&self) -> u8 {
        self.room_uid
    }

    pub fn layer_count(&self) -> u8 {
        self.layers.len() as u8
    }

    pub fn layer_bytes(&self, index: usize) -> Option<&[u8]> {
        self.layers.get(index).map(|l| l.as_bytes())
    }

    pub fn layer_pixel(&self, index: usize, x: i32, y: i32) -> Option<Pixel> {
        self.layers.get(index).and_then(|l| l.pixel(x, y))
    }

    /// The stored signature of another participant, if one has arrived.
    pub fn signature_of(&self, uid: u8) -> Option<&[u8; SIGNATURE_LEN]> {
        self.signatures.get(&uid).map(|b| &**b)
    }

    /// Flatten the mirror for display or export.
    pub fn flatten(&self) -> Vec<u8> {
        composite(&self.layers)
    }

    // -- unreliable sends ---------------------------------------------------

    /// Stamp locally and send the DRAW packet. The local apply and the
    /// server's apply share one code path, so they cannot diverge.
    #[allow(clippy::too_many_arguments)]
    pub fn send_draw(
        &mut self,
        brush_id: u8,
        layer_id: u8,
        x: i16,
        y: i16,
        angle: i16,
        color: Pixel,
        size: u8,
        pressure: u8,
    ) -> Result<()> {
        let dg = Datagram::draw(brush_id, layer_id, x, y, angle, color, size, pressure);
        apply_datagram_to_layers(&mut self.layers, &self.catalog, &dg);
        self.udp.send_to(&dg.encode(), self.server_udp)?;
        Ok(())
    }

    /// Rasterize a line locally and send the LINE packet.
    #[allow(clippy::too_many_arguments)]
    pub fn send_line(
        &mut self,
        brush_id: u8,
        layer_id: u8,
        x0: i16,
        y0: i16,
        x1: i16,
        y1: i16,
        color: Pixel,
        size: u8,
        pressure: u8,
    ) -> Result<()> {
        let dg = Datagram::line(brush_id, layer_id, x0, y0, x1, y1, color, size, pressure);
        apply_datagram_to_layers(&mut self.layers, &self.catalog, &dg);
        self.udp.send_to(&dg.encode(), self.server_udp)?;
        Ok(())
    }

    /// Announce the cursor position; also how a fresh client makes itself
    /// known to the room's unreliable socket.
    pub fn send_cursor(&self, layer_id: u8, x: i16, y: i16) -> Result<()> {
        let dg = Datagram::cursor(self.room_uid, layer_id, x, y);
        self.udp.send_to(&dg.encode(), self.server_udp)?;
        Ok(())
    }

    /// Wait up to `timeout` for one rebroadcast datagram and apply it to
    /// the mirror. `Ok(None)` on timeout.
    pub fn poll_datagram(&mut self, timeout: Duration) -> Result<Option<Datagram>> {
        self.udp.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 64];
        let (len, _) = match self.udp.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match Datagram::decode(&buf[..len]) {
            Ok(dg) => {
                apply_datagram_to_layers(&mut self.layers, &self.catalog, &dg);
                Ok(Some(dg))
            }
            Err(e) => {
                debug!(target: "client", error = %e, "datagram dropped");
                Ok(None)
            }
        }
    }

    // -- reliable sends -----------------------------------------------------

    /// Ask the server to insert a layer. The mirror applies on echo, like
    /// every other subscriber.
    pub fn send_layer_add(&self, at: u8) -> Result<()> {
        let mut frame = Frame::new(MsgType::LayerAdd, self.canvas_id);
        frame.layer_id = at;
        self.send_frame(&frame)
    }

    pub fn send_layer_del(&self, index: u8) -> Result<()> {
        let mut frame = Frame::new(MsgType::LayerDel, self.canvas_id);
        frame.layer_id = index;
        self.send_frame(&frame)
    }

    pub fn send_layer_reorder(&self, from: u8, to: u8) -> Result<()> {
        let mut frame = Frame::with_payload(MsgType::LayerReorder, self.canvas_id, &[from, to]);
        frame.layer_id = from;
        self.send_frame(&frame)
    }

    /// Upload a drawable layer's bitmap to reconcile the room with this
    /// mirror (the reliable answer to lost datagrams).
    pub fn send_layer_sync(&self, index: u8) -> Result<()> {
        let layer = self
            .layers
            .get(index as usize)
            .ok_or_else(|| anyhow!("no layer {index}"))?;
        let mut frame = Frame::new(MsgType::LayerSync, self.canvas_id);
        frame.layer_id = index;
        (&self.stream).write_all(&frame.to_bytes())?;
        (&self.stream).write_all(layer.as_bytes())?;
        Ok(())
    }

    /// Translate a layer locally and tell the room; the server forwards the
    /// move to the other subscribers only.
    pub fn send_layer_move(&mut self, index: u8, dx: i32, dy: i32) -> Result<()> {
        if let Some(layer) = self.layers.get_mut(index as usize) {
            layer.translate(dx, dy);
        }
        let mut payload = [0u8; 8];
        LE::write_i32(&mut payload[0..4], dx);
        LE::write_i32(&mut payload[4..8], dy);
        let mut frame = Frame::with_payload(MsgType::LayerMove, self.canvas_id, &payload);
        frame.layer_id = index;
        self.send_frame(&frame)
    }

    pub fn send_select_layer(&self, index: u8) -> Result<()> {
        let mut frame = Frame::new(MsgType::LayerSelect, self.canvas_id);
        frame.layer_id = index;
        frame.user_id = self.room_uid;
        self.send_frame(&frame)
    }

    /// Publish this user's quantized signature bitmap (exactly 256 bytes).
    pub fn send_signature(&self, signature: &[u8; SIGNATURE_LEN]) -> Result<()> {
        let frame = Frame::with_payload(MsgType::Signature, self.canvas_id, signature);
        self.send_frame(&frame)
    }

    pub fn send_save(&self) -> Result<()> {
        self.send_frame(&Frame::new(MsgType::Save, self.canvas_id))
    }

    pub fn send_logout(&self) -> Result<()> {
        self.send_frame(&Frame::new(MsgType::Logout, self.canvas_id))?;
        let _ = self.stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn send_frame(&self, frame: &Frame) -> Result<()> {
        (&self.stream).write_all(&frame.to_bytes())?;
        Ok(())
    }

    // -- reliable receives --------------------------------------------------

    /// Wait up to `timeout` for one reliable frame and apply it to the
    /// mirror. `Ok(None)` on timeout; unknown frame types are skipped.
    pub fn poll_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.stream.set_read_timeout(Some(timeout))?;
        let frame = match Frame::read_from(&mut self.reader) {
            Ok(frame) => frame,
            Err(ProtoError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(None);
            }
            Err(ProtoError::Io(e)) => return Err(e.into()),
            Err(e) => {
                debug!(target: "client", error = %e, "frame skipped");
                return Ok(None);
            }
        };
        self.apply_frame(&frame)?;
        Ok(Some(frame))
    }

    fn apply_frame(&mut self, frame: &Frame) -> Result<()> {
        match frame.msg_type {
            MsgType::LayerAdd => {
                let at = frame.layer_id as usize;
                if at >= 1 && at <= self.layers.len() {
                    self.layers.insert(at, Layer::transparent());
                } else {
                    self.layers.push(Layer::transparent());
                }
            }
            MsgType::LayerDel => {
                let i = frame.layer_id as usize;
                if i >= 1 && i < self.layers.len() {
                    self.layers.remove(i);
                }
            }
            MsgType::LayerReorder => {
                let payload = frame.payload();
                if payload.len() >= 2 {
                    let (from, to) = (payload[0] as usize, payload[1] as usize);
                    let len = self.layers.len();
                    if from >= 1 && from < len && to >= 1 && to < len && from != to {
                        if from < to {
                            self.layers[from..=to].rotate_left(1);
                        } else {
                            self.layers[to..=from].rotate_right(1);
                        }
                    }
                }
            }
            MsgType::LayerSync => {
                // The bitmap follows the header on the stream.
                let mut bitmap = vec![0u8; LAYER_BYTES];
                self.reader.read_exact(&mut bitmap)?;
                if let Some(layer) = self.layers.get_mut(frame.layer_id as usize) {
                    layer.replace(&bitmap);
                }
            }
            MsgType::LayerMove => {
                let payload = frame.payload();
                if payload.len() >= 8 {
                    let dx = LE::read_i32(&payload[0..4]);
                    let dy = LE::read_i32(&payload[4..8]);
                    if let Some(layer) = self.layers.get_mut(frame.layer_id as usize) {
                        layer.translate(dx, dy);
                    }
                }
            }
            MsgType::Signature => {
                // Our own echo comes back too; drop it by uid.
                if frame.user_id != self.room_uid && frame.data_len as usize == SIGNATURE_LEN {
                    let mut sig = Box::new([0u8; SIGNATURE_LEN]);
                    sig.copy_from_slice(&frame.data);
                    self.signatures.insert(frame.user_id, sig);
                }
            }
            MsgType::LayerSelect | MsgType::Error => {
                debug!(target: "client", msg = ?frame.msg_type, "frame noted");
            }
            other => {
                debug!(target: "client", msg = ?other, "frame ignored");
            }
        }
        Ok(())
    }

    /// Helper for strokes: the wire angle of a segment, as a shell would
    /// compute it for DRAW packets.
    pub fn segment_angle(x0: i16, y0: i16, x1: i16, y1: i16) -> i16 {
        stroke_angle(x0 as i32, y0 as i32, x1 as i32, y1 as i32)
    }
}
