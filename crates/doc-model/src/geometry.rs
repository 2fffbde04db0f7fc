//! Page-space geometry.
//!
//! All coordinates are in points (1/72 inch) in the *unrotated* page frame:
//! origin at the top-left corner of the page in its natural orientation,
//! x increasing to the right and y increasing downward.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

impl PagePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShapeSize {
    pub width: f32,
    pub height: f32,
}

impl ShapeSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Natural (unrotated) size of a page in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub width: f32,
    pub height: f32,
}

impl PageDimensions {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for PageDimensions {
    fn default() -> Self {
        Self { width: 612.0, height: 792.0 }
    }
}

/// 2D affine transform.
///
/// Maps `(x, y)` to `(sx * x + kx * y + tx, ky * x + sy * y + ty)`. The field
/// layout matches tiny-skia's `Transform::from_row` argument order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub sx: f32,
    pub ky: f32,
    pub kx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine { sx: 1.0, ky: 0.0, kx: 0.0, sy: 1.0, tx: 0.0, ty: 0.0 };

    pub fn from_row(sx: f32, ky: f32, kx: f32, sy: f32, tx: f32, ty: f32) -> Self {
        Self { sx, ky, kx, sy, tx, ty }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self { sx, sy, ..Self::IDENTITY }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self { tx, ty, ..Self::IDENTITY }
    }

    pub fn apply(&self, point: PagePoint) -> PagePoint {
        PagePoint {
            x: self.sx * point.x + self.kx * point.y + self.tx,
            y: self.ky * point.x + self.sy * point.y + self.ty,
        }
    }

    /// Returns the transform that applies `self` first, then `next`.
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            sx: next.sx * self.sx + next.kx * self.ky,
            ky: next.ky * self.sx + next.sy * self.ky,
            kx: next.sx * self.kx + next.kx * self.sy,
            sy: next.ky * self.kx + next.sy * self.sy,
            tx: next.sx * self.tx + next.kx * self.ty + next.tx,
            ty: next.ky * self.tx + next.sy * self.ty + next.ty,
        }
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: PagePoint, b: PagePoint) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn composition_applies_left_then_right() {
        let scale = Affine::scale(2.0, 3.0);
        let shift = Affine::translate(10.0, -5.0);
        let combined = scale.then(&shift);

        let point = PagePoint::new(4.0, 1.0);
        assert!(close(combined.apply(point), shift.apply(scale.apply(point))));
        assert!(close(combined.apply(point), PagePoint::new(18.0, -2.0)));
    }

    #[test]
    fn identity_is_neutral() {
        let transform = Affine::from_row(0.0, 1.0, -1.0, 0.0, 100.0, 0.0);
        let point = PagePoint::new(7.0, 9.0);

        assert!(close(transform.then(&Affine::IDENTITY).apply(point), transform.apply(point)));
        assert!(close(Affine::IDENTITY.then(&transform).apply(point), transform.apply(point)));
    }
}
