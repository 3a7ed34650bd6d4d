//! The fixed 18-byte unreliable datagram.

use byteorder::{ByteOrder, LE};
use core_pixel::Pixel;

use crate::{DATAGRAM_LEN, MsgType, ProtoError};

/// One unreliable-channel record: a DRAW stamp, a LINE segment, or a CURSOR
/// position update.
///
/// Field reuse on the wire: for CURSOR, `brush_id` carries the sender's
/// room uid; for DRAW, `ex` carries the stroke angle in degrees; for LINE,
/// `(ex, ey)` is the segment endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    pub kind: MsgType,
    pub brush_id: u8,
    pub layer_id: u8,
    pub x: i16,
    pub y: i16,
    pub ex: i16,
    pub ey: i16,
    pub color: Pixel,
    pub size: u8,
    pub pressure: u8,
}

impl Datagram {
    /// A DRAW stamp at `(x, y)` with the stroke angle in `ex`.
    pub fn draw(
        brush_id: u8,
        layer_id: u8,
        x: i16,
        y: i16,
        angle: i16,
        color: Pixel,
        size: u8,
        pressure: u8,
    ) -> Self {
        Self {
            kind: MsgType::Draw,
            brush_id,
            layer_id,
            x,
            y,
            ex: angle,
            ey: 0,
            color,
            size,
            pressure,
        }
    }

    /// A LINE segment from `(x, y)` to `(ex, ey)`.
    #[allow(clippy::too_many_arguments)]
    pub fn line(
        brush_id: u8,
        layer_id: u8,
        x: i16,
        y: i16,
        ex: i16,
        ey: i16,
        color: Pixel,
        size: u8,
        pressure: u8,
    ) -> Self {
        Self {
            kind: MsgType::Line,
            brush_id,
            layer_id,
            x,
            y,
            ex,
            ey,
            color,
            size,
            pressure,
        }
    }

    /// A CURSOR position update; `room_uid` rides in the brush id slot.
    pub fn cursor(room_uid: u8, layer_id: u8, x: i16, y: i16) -> Self {
        Self {
            kind: MsgType::Cursor,
            brush_id: room_uid,
            layer_id,
            x,
            y,
            ex: 0,
            ey: 0,
            color: Pixel::TRANSPARENT,
            size: 0,
            pressure: 0,
        }
    }

    /// Decode a datagram. Undersized packets and non-datagram types are
    /// rejected; trailing bytes beyond the fixed record are ignored.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtoError> {
        if raw.len() < DATAGRAM_LEN {
            return Err(ProtoError::ShortDatagram(raw.len()));
        }
        let kind = MsgType::try_from(raw[0])?;
        if !kind.is_datagram() {
            return Err(ProtoError::NotADatagram(kind));
        }
        Ok(Self {
            kind,
            brush_id: raw[1],
            layer_id: raw[2],
            x: LE::read_i16(&raw[3..5]),
            y: LE::read_i16(&raw[5..7]),
            ex: LE::read_i16(&raw[7..9]),
            ey: LE::read_i16(&raw[9..11]),
            color: Pixel::new(raw[11], raw[12], raw[13], raw[14]),
            size: raw[15],
            pressure: raw[16],
        })
    }

    pub fn encode(&self) -> [u8; DATAGRAM_LEN] {
        let mut raw = [0u8; DATAGRAM_LEN];
        raw[0] = self.kind as u8;
        raw[1] = self.brush_id;
        raw[2] = self.layer_id;
        LE::write_i16(&mut raw[3..5], self.x);
        LE::write_i16(&mut raw[5..7], self.y);
        LE::write_i16(&mut raw[7..9], self.ex);
        LE::write_i16(&mut raw[9..11], self.ey);
        raw[11] = self.color.r;
        raw[12] = self.color.g;
        raw[13] = self.color.b;
        raw[14] = self.color.a;
        raw[15] = self.size;
        raw[16] = self.pressure;
        raw
    }
}
