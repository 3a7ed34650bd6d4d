//! Integer Bresenham line trajectory.
//!
//! The trajectory is normative for the whole system: a LINE packet stamped
//! on the server must touch exactly the pixels a client's local preview
//! touched. Both endpoints are included.

/// Iterator over the integer points of a Bresenham line from `(x0, y0)` to
/// `(x1, y1)`, inclusive of both endpoints.
#[derive(Debug, Clone)]
pub struct LinePoints {
    cx: i32,
    cy: i32,
    x1: i32,
    y1: i32,
    dx: i32,
    dy: i32,
    sx: i32,
    sy: i32,
    err: i32,
    done: bool,
}

pub fn line_points(x0: i32, y0: i32, x1: i32, y1: i32) -> LinePoints {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    LinePoints {
        cx: x0,
        cy: y0,
        x1,
        y1,
        dx,
        dy,
        sx: if x0 < x1 { 1 } else { -1 },
        sy: if y0 < y1 { 1 } else { -1 },
        err: dx + dy,
        done: false,
    }
}

impl Iterator for LinePoints {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<(i32, i32)> {
        if self.done {
            return None;
        }
        let point = (self.cx, self.cy);
        if self.cx == self.x1 && self.cy == self.y1 {
            self.done = true;
            return Some(point);
        }
        let e2 = 2 * self.err;
        if e2 >= self.dy {
            self.err += self.dy;
            self.cx += self.sx;
        }
        if e2 <= self.dx {
            self.err += self.dx;
            self.cy += self.sy;
        }
        Some(point)
    }
}

/// Stroke direction in whole degrees: `round(atan2(y1 - y0, x1 - x0) · 180/π)`.
///
/// This is the angle a LINE packet feeds to each stamp along the trajectory,
/// and the value a client puts in the `ex` field of a DRAW packet.
pub fn stroke_angle(x0: i32, y0: i32, x1: i32, y1: i32) -> i16 {
    let rad = ((y1 - y0) as f32).atan2((x1 - x0) as f32);
    rad.to_degrees().round() as i16
}
