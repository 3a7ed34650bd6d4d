//! The fixed 263-byte reliable frame.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::{FRAME_DATA_CAP, FRAME_LEN, MsgType, ProtoError};

/// One reliable-channel record.
///
/// Layout (little-endian): `type u8, canvas_id u8, data_len u16,
/// layer_count u8, layer_id u8, user_id u8, data [256]`. The data block is
/// always transmitted whole; `data_len` marks the significant prefix.
#[derive(Clone)]
pub struct Frame {
    pub msg_type: MsgType,
    pub canvas_id: u8,
    pub data_len: u16,
    pub layer_count: u8,
    pub layer_id: u8,
    pub user_id: u8,
    pub data: [u8; FRAME_DATA_CAP],
}

impl Frame {
    /// A zeroed frame of the given type addressed to one canvas.
    pub fn new(msg_type: MsgType, canvas_id: u8) -> Self {
        Self {
            msg_type,
            canvas_id,
            data_len: 0,
            layer_count: 0,
            layer_id: 0,
            user_id: 0,
            data: [0; FRAME_DATA_CAP],
        }
    }

    /// A frame carrying `payload` in its data block. Panics in debug builds
    /// if the payload exceeds the block; callers own that bound.
    pub fn with_payload(msg_type: MsgType, canvas_id: u8, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= FRAME_DATA_CAP);
        let mut frame = Self::new(msg_type, canvas_id);
        let len = payload.len().min(FRAME_DATA_CAP);
        frame.data[..len].copy_from_slice(&payload[..len]);
        frame.data_len = len as u16;
        frame
    }

    /// The significant prefix of the data block.
    pub fn payload(&self) -> &[u8] {
        let len = (self.data_len as usize).min(FRAME_DATA_CAP);
        &self.data[..len]
    }

    /// Read one full frame from the stream. A short read surfaces as an
    /// `Io` error and the connection should be dropped; an unknown type is
    /// reported after the whole record has been consumed so the caller can
    /// skip it and keep reading.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtoError> {
        let mut raw = [0u8; FRAME_LEN];
        r.read_exact(&mut raw)?;
        Self::from_bytes(&raw)
    }

    /// Decode a frame from exactly [`FRAME_LEN`] bytes.
    pub fn from_bytes(raw: &[u8; FRAME_LEN]) -> Result<Self, ProtoError> {
        let mut r = &raw[..];
        let type_byte = r.read_u8()?;
        let canvas_id = r.read_u8()?;
        let data_len = r.read_u16::<LE>()?;
        let layer_count = r.read_u8()?;
        let layer_id = r.read_u8()?;
        let user_id = r.read_u8()?;
        let mut data = [0u8; FRAME_DATA_CAP];
        r.read_exact(&mut data)?;
        let msg_type = MsgType::try_from(type_byte)?;
        Ok(Self {
            msg_type,
            canvas_id,
            data_len,
            layer_count,
            layer_id,
            user_id,
            data,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut raw = [0u8; FRAME_LEN];
        {
            let mut cursor = &mut raw[..];
            // Infallible: the buffer is exactly FRAME_LEN.
            let _ = cursor.write_u8(self.msg_type as u8);
            let _ = cursor.write_u8(self.canvas_id);
            let _ = cursor.write_u16::<LE>(self.data_len);
            let _ = cursor.write_u8(self.layer_count);
            let _ = cursor.write_u8(self.layer_id);
            let _ = cursor.write_u8(self.user_id);
            let _ = cursor.write_all(&self.data);
        }
        raw
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("msg_type", &self.msg_type)
            .field("canvas_id", &self.canvas_id)
            .field("data_len", &self.data_len)
            .field("layer_count", &self.layer_count)
            .field("layer_id", &self.layer_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
