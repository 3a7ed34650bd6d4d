//! Persistence: the multi-canvas document, its per-layer pixel encoding,
//! and the dirty-driven save loop.
//!
//! One UTF-8 JSON document holds every room's drawable layers. Each layer
//! is serialized as `W·H` 32-bit big-endian `(r<<24)|(g<<16)|(b<<8)|a`
//! words in y-major order (byte-for-byte the layer's raw RGBA buffer),
//! compressed with PackBits and wrapped in standard base64. Clean layers
//! reuse their cached blob verbatim; only dirty layers are re-encoded.

use thiserror::Error;

mod blob;
mod document;
mod packbits;
mod store;

pub use blob::{DecodedLayer, decode_layer, encode_layer};
pub use document::{CanvasDoc, DOC_VERSION, Document, LayerDoc};
pub use packbits::{decode as packbits_decode, encode as packbits_encode};
pub use store::{
    DEFAULT_DOCUMENT, SaveSignal, build_document, load, save_if_dirty, spawn_save_loop,
    write_document,
};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("truncated run-length stream")]
    TruncatedRle,
    #[error("layer blob decodes to {got} bytes, expected {expected}")]
    LayerSize { expected: usize, got: usize },
    #[error("unsupported document version {0}")]
    Version(u32),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
