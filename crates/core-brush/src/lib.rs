//! Brush catalog: the fixed set of stamping functions keyed by wire id.
//!
//! A stamp is a pure function from `(center, color, size, pressure, angle)`
//! to a set of clamped pixel writes. The catalog is an owned value handed to
//! whoever needs it (the server and the client mirror each hold one); there
//! is no process-global registry. Erasers do not produce ordinary
//! source-over writes, so every brush reports its own [`WriteMode`] and
//! consumers must honor it.
//!
//! Invariants:
//! * Catalog slot `i` holds the brush with wire id `i`.
//! * Every produced write lies inside the canvas rectangle.
//! * An out-of-catalog id resolves to the round brush (id 0).

use core_pixel::{Pixel, WriteMode, CANVAS_HEIGHT, CANVAS_WIDTH};

mod stamps;
pub use stamps::{Airbrush, HardEraser, PressureBrush, Round, SoftEraser, Square, Textured};

/// Parameters for one stamp application.
#[derive(Debug, Clone, Copy)]
pub struct StampContext {
    pub x: i32,
    pub y: i32,
    pub color: Pixel,
    pub size: u8,
    /// Stylus pressure, `0..=255`. Brushes that ignore it treat it as full.
    pub pressure: u8,
    /// Stroke direction in whole degrees; only the textured brush reads it.
    pub angle: i16,
}

/// One clamped pixel write produced by a stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWrite {
    pub x: i32,
    pub y: i32,
    pub pixel: Pixel,
}

/// Push a write if it lies inside the canvas rectangle; silently drop it
/// otherwise.
pub(crate) fn push_clamped(out: &mut Vec<PixelWrite>, x: i32, y: i32, pixel: Pixel) {
    if x >= 0 && y >= 0 && (x as usize) < CANVAS_WIDTH && (y as usize) < CANVAS_HEIGHT {
        out.push(PixelWrite { x, y, pixel });
    }
}

pub trait Brush: Send + Sync {
    /// Wire identifier, equal to the catalog slot.
    fn id(&self) -> u8;
    /// Stable human-readable name for logging.
    fn name(&self) -> &'static str;
    /// How this brush's writes combine with the destination.
    fn write_mode(&self) -> WriteMode {
        WriteMode::SourceOver
    }
    /// Append this brush's pixel writes for one stamp to `out`.
    fn stamp(&self, ctx: &StampContext, out: &mut Vec<PixelWrite>);
}

/// Ordered brush catalog. Slot index equals wire id.
pub struct BrushCatalog {
    brushes: Vec<Box<dyn Brush>>,
}

impl BrushCatalog {
    /// The standard seven-entry catalog (ids 0..=6).
    pub fn standard() -> Self {
        let brushes: Vec<Box<dyn Brush>> = vec![
            Box::new(Round::new(1.0)),
            Box::new(Square::new(1.0)),
            Box::new(HardEraser::new()),
            Box::new(SoftEraser::new(1.0)),
            Box::new(PressureBrush::new()),
            Box::new(Airbrush::new()),
            Box::new(Textured::new()),
        ];
        debug_assert!(
            brushes.iter().enumerate().all(|(i, b)| b.id() as usize == i),
            "catalog slots must equal wire ids"
        );
        Self { brushes }
    }

    /// Resolve a wire id, falling back to the round brush for ids past the
    /// end of the catalog.
    pub fn get(&self, id: u8) -> &dyn Brush {
        self.brushes
            .get(id as usize)
            .unwrap_or(&self.brushes[0])
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.brushes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brushes.is_empty()
    }
}
