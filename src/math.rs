//! Small numeric helpers shared by the clipper and the two rasterization stages.
//!
//! The crate otherwise leans on `vek` (euc's own dependency) for `Vec2`/`Vec3`/`Vec4`/
//! `Mat3` arithmetic; this module only adds the handful of helpers `vek` doesn't provide.

pub use vek::{Mat3, Vec2, Vec3, Vec4};

/// A barycentric plane equation `a*x + b*y + c`, precomputed once per binned triangle.
///
/// Evaluating it at a pixel center is a single dot product with `(x, y, 1)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct PlaneEq {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PlaneEq {
    #[inline(always)]
    pub fn eval(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }
}

/// Solve for the three barycentric plane equations of a screen-space triangle.
///
/// `denom` is `(x0-x2)(y1-y0) - (x0-x1)(y2-y0)`; triangles with `denom == 0` are degenerate and
/// must be rejected by the caller before calling this (dividing by zero would poison every
/// downstream fragment).
pub fn barycentric_planes(p0: Vec2<f32>, p1: Vec2<f32>, p2: Vec2<f32>) -> [PlaneEq; 3] {
    let denom = (p0.x - p2.x) * (p1.y - p0.y) - (p0.x - p1.x) * (p2.y - p0.y);
    debug_assert!(denom != 0.0, "degenerate triangle passed to barycentric_planes");
    let inv = 1.0 / denom;

    // Weight of vertex 0 is 1 at p0 and 0 along the p1-p2 edge, and so on cyclically.
    let w0 = PlaneEq {
        a: (p1.y - p2.y) * inv,
        b: (p2.x - p1.x) * inv,
        c: (p1.x * p2.y - p2.x * p1.y) * inv,
    };
    let w1 = PlaneEq {
        a: (p2.y - p0.y) * inv,
        b: (p0.x - p2.x) * inv,
        c: (p2.x * p0.y - p0.x * p2.y) * inv,
    };
    // w2 = 1 - w0 - w1 at every point, so it's cheaper to derive than re-solve.
    let w2 = PlaneEq {
        a: -(w0.a + w1.a),
        b: -(w0.b + w1.b),
        c: 1.0 - (w0.c + w1.c),
    };

    [w0, w1, w2]
}

#[inline(always)]
pub fn lerp2(a: Vec4<f32>, b: Vec4<f32>, ta: f32, tb: f32) -> Vec4<f32> {
    a * ta + b * tb
}

#[inline(always)]
pub fn lerp3(a: Vec4<f32>, b: Vec4<f32>, c: Vec4<f32>, ta: f32, tb: f32, tc: f32) -> Vec4<f32> {
    a * ta + b * tb + c * tc
}

/// Round a byte size up to the next page boundary (4 KiB), matching euc's
/// "page-aligned pixel byte buffer" requirement for textures and raw buffers.
pub fn page_align(size: usize) -> usize {
    const PAGE: usize = 4096;
    (size + PAGE - 1) / PAGE * PAGE
}
