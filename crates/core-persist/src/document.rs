//! The on-disk document model.
//!
//! Field names are part of the format; a compliant reader consumes exactly
//! what this writer emits.

use serde::{Deserialize, Serialize};

pub const DOC_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    /// Canvas dimensions at write time, used to clip on mismatch at load.
    pub width: u32,
    pub height: u32,
    pub canvases: Vec<CanvasDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasDoc {
    pub id: u8,
    /// Number of drawable layers (total minus the paper layer).
    pub layer_count: u8,
    pub layers: Vec<LayerDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDoc {
    /// The layer's position in the room, always ≥ 1.
    pub index: u8,
    /// Base64-wrapped, PackBits-compressed bitmap.
    pub data: String,
}
