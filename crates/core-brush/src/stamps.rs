//! The seven stamp implementations.
//!
//! Geometry conventions shared by the disc and square brushes: the integer
//! half-extent is `size / 2`, so a size-5 disc covers `dx² + dy² ≤ 4` and a
//! size-10 square covers `|dx| ≤ 5 ∧ |dy| ≤ 5`. Brushes with soft edges
//! work in float radii and round only the final alpha.

use core_pixel::{Pixel, WriteMode};

use crate::{Brush, PixelWrite, StampContext, push_clamped};

/// Fixed bristle density pattern sampled by the textured brush. 32 entries
/// in `[0.25, 1.0]`; the stamp indexes it modulo its length so any brush
/// size sees the same repeating texture.
const BRISTLE_PATTERN: [f32; 32] = [
    0.91, 0.42, 0.77, 0.33, 0.98, 0.55, 0.27, 0.84, 0.63, 0.39, 1.00, 0.48,
    0.72, 0.30, 0.88, 0.59, 0.25, 0.95, 0.44, 0.81, 0.36, 0.69, 0.52, 0.99,
    0.31, 0.76, 0.46, 0.87, 0.28, 0.66, 0.93, 0.40,
];

fn pressure_unit(pressure: u8) -> f32 {
    pressure as f32 / 255.0
}

/// Id 0: filled disc of radius `size / 2`, solid color scaled by the brush
/// opacity multiplier.
pub struct Round {
    opacity: f32,
}

impl Round {
    pub fn new(opacity: f32) -> Self {
        Self { opacity }
    }
}

impl Brush for Round {
    fn id(&self) -> u8 {
        0
    }

    fn name(&self) -> &'static str {
        "round"
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        let r = (ctx.size / 2) as i32;
        let rr = r * r;
        let color = ctx.color.with_alpha_scaled(self.opacity);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= rr {
                    push_clamped(out, ctx.x + dx, ctx.y + dy, color);
                }
            }
        }
    }
}

/// Id 1: filled square of side `size`, solid color.
pub struct Square {
    opacity: f32,
}

impl Square {
    pub fn new(opacity: f32) -> Self {
        Self { opacity }
    }
}

impl Brush for Square {
    fn id(&self) -> u8 {
        1
    }

    fn name(&self) -> &'static str {
        "square"
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        let half = (ctx.size / 2) as i32;
        let color = ctx.color.with_alpha_scaled(self.opacity);
        for dy in -half..=half {
            for dx in -half..=half {
                push_clamped(out, ctx.x + dx, ctx.y + dy, color);
            }
        }
    }
}

/// Id 2: hard eraser. Writes transparent black over a square of side
/// `size`; consumers assign the writes directly instead of blending.
pub struct HardEraser;

impl HardEraser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HardEraser {
    fn default() -> Self {
        Self::new()
    }
}

impl Brush for HardEraser {
    fn id(&self) -> u8 {
        2
    }

    fn name(&self) -> &'static str {
        "hard eraser"
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Replace
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        let half = (ctx.size / 2) as i32;
        for dy in -half..=half {
            for dx in -half..=half {
                push_clamped(out, ctx.x + dx, ctx.y + dy, Pixel::TRANSPARENT);
            }
        }
    }
}

/// Id 3: soft eraser. Cubic radial falloff scaled by pressure and the brush
/// opacity multiplier; the produced alpha is the erase strength subtracted
/// from the destination alpha.
pub struct SoftEraser {
    opacity: f32,
}

impl SoftEraser {
    pub fn new(opacity: f32) -> Self {
        Self { opacity }
    }
}

impl Brush for SoftEraser {
    fn id(&self) -> u8 {
        3
    }

    fn name(&self) -> &'static str {
        "soft eraser"
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::EraseSubtract
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        let p = pressure_unit(ctx.pressure);
        let radius = ctx.size as f32 / 2.0;
        if radius <= 0.0 {
            let strength = (255.0 * p * self.opacity).round() as u8;
            push_clamped(out, ctx.x, ctx.y, Pixel::new(0, 0, 0, strength));
            return;
        }
        let bound = radius.ceil() as i32;
        for dy in -bound..=bound {
            for dx in -bound..=bound {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                if dist > radius {
                    continue;
                }
                let falloff = 1.0 - dist / radius;
                let strength = falloff * falloff * falloff * p * self.opacity;
                let alpha = (255.0 * strength).round() as u8;
                if alpha > 0 {
                    push_clamped(out, ctx.x + dx, ctx.y + dy, Pixel::new(0, 0, 0, alpha));
                }
            }
        }
    }
}

/// Id 4: pressure-sensitive disc. Effective diameter `size · (0.3 + 0.7p)`
/// with a 1.5-pixel feathered edge and alpha curve `0.2 + 0.8·√p`.
pub struct PressureBrush;

impl PressureBrush {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PressureBrush {
    fn default() -> Self {
        Self::new()
    }
}

impl Brush for PressureBrush {
    fn id(&self) -> u8 {
        4
    }

    fn name(&self) -> &'static str {
        "pressure"
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        const FEATHER: f32 = 1.5;
        let p = pressure_unit(ctx.pressure);
        let radius = ctx.size as f32 * (0.3 + 0.7 * p) / 2.0;
        let alpha_curve = 0.2 + 0.8 * p.sqrt();
        let bound = radius.ceil() as i32;
        for dy in -bound..=bound {
            for dx in -bound..=bound {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                if dist > radius {
                    continue;
                }
                let coverage = ((radius - dist) / FEATHER).clamp(0.0, 1.0);
                let pixel = ctx.color.with_alpha_scaled(alpha_curve * coverage);
                if pixel.a > 0 {
                    push_clamped(out, ctx.x + dx, ctx.y + dy, pixel);
                }
            }
        }
    }
}

/// Id 5: airbrush. Disc of radius `size · (0.5 + 0.5p)` with squared radial
/// falloff and alpha multiplier `0.15 + 0.85p`.
pub struct Airbrush;

impl Airbrush {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Airbrush {
    fn default() -> Self {
        Self::new()
    }
}

impl Brush for Airbrush {
    fn id(&self) -> u8 {
        5
    }

    fn name(&self) -> &'static str {
        "airbrush"
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        let p = pressure_unit(ctx.pressure);
        let radius = ctx.size as f32 * (0.5 + 0.5 * p);
        if radius <= 0.0 {
            return;
        }
        let alpha_mult = 0.15 + 0.85 * p;
        let bound = radius.ceil() as i32;
        for dy in -bound..=bound {
            for dx in -bound..=bound {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                if dist > radius {
                    continue;
                }
                let falloff = 1.0 - dist / radius;
                let pixel = ctx
                    .color
                    .with_alpha_scaled(falloff * falloff * alpha_mult);
                if pixel.a > 0 {
                    push_clamped(out, ctx.x + dx, ctx.y + dy, pixel);
                }
            }
        }
    }
}

/// Id 6: textured bristle brush. Stamps `size` samples across the
/// perpendicular of the stroke direction, modulated by the fixed bristle
/// pattern and a square-root pressure curve, with quartic falloff toward
/// the stroke tips.
pub struct Textured;

impl Textured {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Textured {
    fn default() -> Self {
        Self::new()
    }
}

impl Brush for Textured {
    fn id(&self) -> u8 {
        6
    }

    fn name(&self) -> &'static str {
        "textured"
    }

    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>) {
        let samples = (ctx.size as usize).max(1);
        let theta = (ctx.angle as f32).to_radians();
        // Perpendicular of the stroke direction vector (cos θ, sin θ).
        let (perp_x, perp_y) = (-theta.sin(), theta.cos());
        let half = ctx.size as f32 / 2.0;
        let pressure_curve = pressure_unit(ctx.pressure).sqrt();

        for i in 0..samples {
            let t = if samples > 1 {
                i as f32 / (samples - 1) as f32 * 2.0 - 1.0
            } else {
                0.0
            };
            // Quartic falloff toward the two tips of the bristle line.
            let tip = 1.0 - t * t * t * t;
            let bristle = BRISTLE_PATTERN[i % BRISTLE_PATTERN.len()];
            let pixel = ctx
                .color
                .with_alpha_scaled(bristle * pressure_curve * tip);
            if pixel.a == 0 {
                continue;
            }
            let px = (ctx.x as f32 + perp_x * t * half).round() as i32;
            let py = (ctx.y as f32 + perp_y * t * half).round() as i32;
            push_clamped(out, px, py, pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(size: u8, pressure: u8) -> StampContext {
        StampContext {
            x: 100,
            y: 100,
            color: Pixel::new(0, 0, 0, 255),
            size,
            pressure,
            angle: 0,
        }
    }

    fn writes(brush: &dyn Brush, ctx: &StampContext) -> Vec<PixelWrite> {
        let mut out = Vec::new();
        brush.stamp(ctx, &mut out);
        out
    }

    #[test]
    fn round_size_five_is_the_radius_two_disc() {
        // Scenario: size 5 at (100, 100) covers exactly dx² + dy² ≤ 4.
        let out = writes(&Round::new(1.0), &ctx(5, 255));
        for w in &out {
            let (dx, dy) = (w.x - 100, w.y - 100);
            assert!(dx * dx + dy * dy <= 4, "({dx},{dy}) outside the disc");
            assert_eq!(w.pixel, Pixel::new(0, 0, 0, 255));
        }
        for dy in -3i32..=3 {
            for dx in -3i32..=3 {
                let inside = dx * dx + dy * dy <= 4;
                let present = out.iter().any(|w| w.x == 100 + dx && w.y == 100 + dy);
                assert_eq!(inside, present, "({dx},{dy})");
            }
        }
    }

    #[test]
    fn hard_eraser_covers_the_closed_square() {
        // Scenario: size 10 covers |dx| ≤ 5 ∧ |dy| ≤ 5 with transparent black.
        let out = writes(&HardEraser::new(), &ctx(10, 255));
        assert_eq!(out.len(), 11 * 11);
        for w in &out {
            assert!((w.x - 100).abs() <= 5 && (w.y - 100).abs() <= 5);
            assert_eq!(w.pixel, Pixel::TRANSPARENT);
        }
    }

    #[test]
    fn square_matches_eraser_footprint() {
        let square = writes(&Square::new(1.0), &ctx(10, 255));
        let eraser = writes(&HardEraser::new(), &ctx(10, 255));
        let sq: Vec<_> = square.iter().map(|w| (w.x, w.y)).collect();
        let er: Vec<_> = eraser.iter().map(|w| (w.x, w.y)).collect();
        assert_eq!(sq, er);
    }

    #[test]
    fn soft_eraser_strength_peaks_at_center() {
        let out = writes(&SoftEraser::new(1.0), &ctx(12, 255));
        let center = out
            .iter()
            .find(|w| w.x == 100 && w.y == 100)
            .expect("center write");
        assert_eq!(center.pixel.a, 255);
        for w in &out {
            assert!(w.pixel.a <= center.pixel.a);
            assert_eq!((w.pixel.r, w.pixel.g, w.pixel.b), (0, 0, 0));
        }
    }

    #[test]
    fn soft_eraser_scales_with_pressure() {
        let full = writes(&SoftEraser::new(1.0), &ctx(12, 255));
        let half = writes(&SoftEraser::new(1.0), &ctx(12, 128));
        let peak = |v: &[PixelWrite]| v.iter().map(|w| w.pixel.a).max().unwrap_or(0);
        assert!(peak(&half) < peak(&full));
    }

    #[test]
    fn pressure_brush_footprint_grows_with_pressure() {
        let light = writes(&PressureBrush::new(), &ctx(20, 30));
        let heavy = writes(&PressureBrush::new(), &ctx(20, 255));
        assert!(light.len() < heavy.len());
    }

    #[test]
    fn airbrush_alpha_bounded_by_multiplier() {
        let out = writes(&Airbrush::new(), &ctx(10, 255));
        assert!(!out.is_empty());
        // Full pressure multiplier is 1.0; the center write carries the
        // falloff peak, everything else is strictly weaker.
        let peak = out.iter().map(|w| w.pixel.a).max().unwrap();
        for w in &out {
            assert!(w.pixel.a <= peak);
        }
    }

    #[test]
    fn textured_follows_the_perpendicular() {
        // Horizontal stroke (angle 0): bristles spread vertically.
        let out = writes(&Textured::new(), &ctx(9, 255));
        assert!(!out.is_empty());
        assert!(out.iter().all(|w| w.x == 100));
        assert!(out.iter().any(|w| w.y < 100) && out.iter().any(|w| w.y > 100));

        // Vertical stroke: bristles spread horizontally.
        let mut c = ctx(9, 255);
        c.angle = 90;
        let out = writes(&Textured::new(), &c);
        assert!(out.iter().all(|w| w.y == 100));
    }

    #[test]
    fn zero_pressure_still_stamps_something_solid() {
        // The round brush ignores pressure entirely.
        let out = writes(&Round::new(1.0), &ctx(5, 0));
        assert!(!out.is_empty());
        assert!(out.iter().all(|w| w.pixel.a == 255));
    }
}
