//! Per-layer blob codec: PackBits over the raw bitmap, wrapped in base64.
//!
//! The document stores each layer as 32-bit big-endian
//! `(r<<24)|(g<<16)|(b<<8)|a` words in y-major order, which lays down
//! exactly the bytes R, G, B, A per pixel: the layer buffer itself. The
//! codec therefore compresses the buffer directly instead of re-packing
//! words.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use core_pixel::{CANVAS_HEIGHT, CANVAS_WIDTH, LAYER_BYTES};

use crate::{PersistError, packbits};

/// Encode one layer bitmap into its document blob.
pub fn encode_layer(pixels: &[u8]) -> String {
    STANDARD.encode(packbits::encode(pixels))
}

/// A decoded layer plus whether the stored dimensions matched the current
/// canvas exactly. A clipped layer must not reuse the stored blob as its
/// cache, since the blob no longer decodes to the layer's bytes.
pub struct DecodedLayer {
    pub pixels: Vec<u8>,
    pub exact: bool,
}

/// Decode one blob recorded at `src_width × src_height`, clipping into the
/// current canvas rectangle when the stored dimensions differ.
pub fn decode_layer(
    blob: &str,
    src_width: usize,
    src_height: usize,
) -> Result<DecodedLayer, PersistError> {
    let compressed = STANDARD.decode(blob)?;
    let bytes = packbits::decode(&compressed)?;
    let expected = src_width * src_height * 4;
    if bytes.len() != expected {
        return Err(PersistError::LayerSize {
            expected,
            got: bytes.len(),
        });
    }
    if src_width == CANVAS_WIDTH && src_height == CANVAS_HEIGHT {
        return Ok(DecodedLayer {
            pixels: bytes,
            exact: true,
        });
    }

    let mut pixels = vec![0u8; LAYER_BYTES];
    let rows = src_height.min(CANVAS_HEIGHT);
    let row_bytes = src_width.min(CANVAS_WIDTH) * 4;
    for y in 0..rows {
        let src = y * src_width * 4;
        let dst = y * CANVAS_WIDTH * 4;
        pixels[dst..dst + row_bytes].copy_from_slice(&bytes[src..src + row_bytes]);
    }
    Ok(DecodedLayer {
        pixels,
        exact: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_size_round_trip_is_exact() {
        let mut pixels = vec![0u8; LAYER_BYTES];
        pixels[0..4].copy_from_slice(&[1, 2, 3, 4]);
        pixels[LAYER_BYTES - 4..].copy_from_slice(&[5, 6, 7, 8]);

        let blob = encode_layer(&pixels);
        let decoded = decode_layer(&blob, CANVAS_WIDTH, CANVAS_HEIGHT).unwrap();
        assert!(decoded.exact);
        assert_eq!(decoded.pixels, pixels);
    }

    #[test]
    fn smaller_source_lands_in_the_top_left() {
        // A 2×2 source of solid 9s.
        let small = vec![9u8; 2 * 2 * 4];
        let blob = encode_layer(&small);
        let decoded = decode_layer(&blob, 2, 2).unwrap();
        assert!(!decoded.exact);
        assert_eq!(decoded.pixels.len(), LAYER_BYTES);
        assert_eq!(&decoded.pixels[..8], &[9; 8]);
        // Second row starts at the current canvas stride.
        let row1 = CANVAS_WIDTH * 4;
        assert_eq!(&decoded.pixels[row1..row1 + 8], &[9; 8]);
        // Beyond the clip everything is transparent.
        assert_eq!(&decoded.pixels[8..12], &[0; 4]);
    }

    #[test]
    fn larger_source_is_clipped() {
        let wide = CANVAS_WIDTH + 10;
        let src = vec![3u8; wide * 2 * 4];
        let blob = encode_layer(&src);
        let decoded = decode_layer(&blob, wide, 2).unwrap();
        assert!(!decoded.exact);
        let row0 = &decoded.pixels[..CANVAS_WIDTH * 4];
        assert!(row0.iter().all(|&b| b == 3));
        let row2 = &decoded.pixels[2 * CANVAS_WIDTH * 4..3 * CANVAS_WIDTH * 4];
        assert!(row2.iter().all(|&b| b == 0));
    }

    #[test]
    fn wrong_payload_length_is_rejected() {
        let blob = encode_layer(&[1, 2, 3, 4]);
        assert!(matches!(
            decode_layer(&blob, 4, 4),
            Err(PersistError::LayerSize { .. })
        ));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(matches!(
            decode_layer("not!!base64", 1, 1),
            Err(PersistError::Base64(_))
        ));
    }

    #[test]
    fn blob_uses_standard_alphabet_with_padding() {
        let blob = encode_layer(&[0u8; 7]);
        assert!(blob.chars().all(|c| c.is_ascii_alphanumeric() || "+/=".contains(c)));
    }
}
