//! Wire protocol: message types, the 263-byte reliable frame, and the
//! 18-byte unreliable datagram.
//!
//! All multi-byte integers are little-endian. Reliable frames are fixed
//! size; the opaque `data` block is always transmitted in full and
//! `data_len` marks the significant prefix. Two messages carry trailing
//! payloads on the same stream: `LAYER_SYNC` is followed by one raw layer
//! bitmap, and `WELCOME` is followed by a 32-bit layer count plus the
//! drawable bitmaps in index order.
//!
//! Reading a stream: read one full frame, dispatch on `msg_type`, then (for
//! the two bulk messages) read the trailing payload before the next frame.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use thiserror::Error;

mod datagram;
mod frame;

pub use datagram::Datagram;
pub use frame::Frame;

/// Fixed TCP port of the reliable channel.
pub const TCP_PORT: u16 = 6769;

/// Size of the opaque data block in every reliable frame.
pub const FRAME_DATA_CAP: usize = 256;
/// Total encoded size of a reliable frame.
pub const FRAME_LEN: usize = 263;
/// Total encoded size of an unreliable datagram.
pub const DATAGRAM_LEN: usize = 18;

/// Signature payloads are always this long on the wire.
pub const SIGNATURE_LEN: usize = 256;
/// Signature bitmap geometry: 2-bit grayscale cells, row-major,
/// most-significant cell first within a byte.
pub const SIGNATURE_CELLS_WIDE: usize = 45;
pub const SIGNATURE_CELLS_TALL: usize = 15;
/// Bytes actually carrying cells (45·15 cells · 2 bits, rounded up); the
/// remainder of the 256-byte payload is zero padding.
pub const SIGNATURE_USED_BYTES: usize =
    (SIGNATURE_CELLS_WIDE * SIGNATURE_CELLS_TALL * 2).div_ceil(8);

/// UDP port of an Active room's unreliable socket, derived from the
/// reliable port a deployment listens on.
pub fn udp_port_for(tcp_port: u16, canvas_id: u8) -> u16 {
    tcp_port + 1 + canvas_id as u16
}

/// UDP port of an Active room in the reference deployment.
pub fn udp_port(canvas_id: u8) -> u16 {
    udp_port_for(TCP_PORT, canvas_id)
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("datagram too short: {0} bytes")]
    ShortDatagram(usize),
    #[error("message type {0:?} is not valid on the unreliable channel")]
    NotADatagram(MsgType),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reliable and unreliable message identifiers. Wire value 16 is
/// intentionally unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Login = 1,
    Logout = 2,
    Welcome = 3,
    CanvasData = 4,
    Save = 5,
    Draw = 6,
    Cursor = 7,
    Line = 8,
    Error = 9,
    LayerAdd = 10,
    LayerDel = 11,
    LayerSelect = 12,
    LayerSync = 13,
    LayerReorder = 14,
    Signature = 15,
    LayerMove = 17,
}

impl MsgType {
    /// True for the message kinds carried on the unreliable channel.
    pub fn is_datagram(self) -> bool {
        matches!(self, MsgType::Draw | MsgType::Line | MsgType::Cursor)
    }
}

impl TryFrom<u8> for MsgType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, ProtoError> {
        Ok(match value {
            1 => MsgType::Login,
            2 => MsgType::Logout,
            3 => MsgType::Welcome,
            4 => MsgType::CanvasData,
            5 => MsgType::Save,
            6 => MsgType::Draw,
            7 => MsgType::Cursor,
            8 => MsgType::Line,
            9 => MsgType::Error,
            10 => MsgType::LayerAdd,
            11 => MsgType::LayerDel,
            12 => MsgType::LayerSelect,
            13 => MsgType::LayerSync,
            14 => MsgType::LayerReorder,
            15 => MsgType::Signature,
            17 => MsgType::LayerMove,
            other => return Err(ProtoError::UnknownType(other)),
        })
    }
}

/// Write the `WELCOME` bulk payload: a 32-bit layer count followed by the
/// drawable bitmaps (`layer_count - 1` of them) in index order.
pub fn write_welcome_bulk<W: Write>(
    w: &mut W,
    layer_count: u32,
    drawables: impl IntoIterator<Item = impl AsRef<[u8]>>,
) -> io::Result<()> {
    w.write_u32::<LE>(layer_count)?;
    for bitmap in drawables {
        w.write_all(bitmap.as_ref())?;
    }
    Ok(())
}

/// Read the 32-bit layer count that opens the `WELCOME` bulk payload.
pub fn read_welcome_layer_count<R: Read>(r: &mut R) -> io::Result<u32> {
    r.read_u32::<LE>()
}
