//! The shared stroke path.
//!
//! Both the server's room worker and the client's local mirror feed
//! DRAW/LINE datagrams through this one function, which is what makes the
//! two sides agree pixel-for-pixel: same brush catalog, same trajectory,
//! same write modes.

use core_brush::{BrushCatalog, PixelWrite, StampContext};
use core_pixel::line_points;
use core_proto::{Datagram, MsgType};

use crate::layer::Layer;

/// Apply one DRAW or LINE datagram to a layer stack. CURSOR packets touch
/// nothing. Returns true when at least one pixel write landed.
///
/// The addressed layer index is clamped to the drawable range `[1, len)`;
/// out-of-range values fall back inside it, never onto the paper layer.
pub fn apply_datagram_to_layers(
    layers: &mut [Layer],
    catalog: &BrushCatalog,
    dg: &Datagram,
) -> bool {
    debug_assert!(layers.len() >= 2, "a room always has paper plus one drawable");
    let layer_idx = (dg.layer_id as usize).clamp(1, layers.len() - 1);
    let mut scratch = Vec::new();
    match dg.kind {
        MsgType::Draw => stamp_at(layers, catalog, dg, layer_idx, dg.x as i32, dg.y as i32, dg.ex, &mut scratch),
        MsgType::Line => {
            let angle = core_pixel::stroke_angle(
                dg.x as i32,
                dg.y as i32,
                dg.ex as i32,
                dg.ey as i32,
            );
            let mut touched = false;
            for (px, py) in line_points(dg.x as i32, dg.y as i32, dg.ex as i32, dg.ey as i32) {
                touched |= stamp_at(layers, catalog, dg, layer_idx, px, py, angle, &mut scratch);
            }
            touched
        }
        _ => false,
    }
}

fn stamp_at(
    layers: &mut [Layer],
    catalog: &BrushCatalog,
    dg: &Datagram,
    layer_idx: usize,
    x: i32,
    y: i32,
    angle: i16,
    scratch: &mut Vec<PixelWrite>,
) -> bool {
    let brush = catalog.get(dg.brush_id);
    let ctx = StampContext {
        x,
        y,
        color: dg.color,
        size: dg.size,
        pressure: dg.pressure,
        angle,
    };
    scratch.clear();
    brush.stamp(&ctx, scratch);
    if scratch.is_empty() {
        return false;
    }
    let mode = brush.write_mode();
    let layer = &mut layers[layer_idx];
    for w in scratch.iter() {
        layer.write(w.x, w.y, w.pixel, mode);
    }
    true
}
