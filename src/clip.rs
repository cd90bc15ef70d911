//! Homogeneous clipping: classify a triangle against the six clip planes and, for partially
//! visible triangles, Sutherland–Hodgman clip and fan-triangulate the result.
//!
//! Grounded on `soft_render`'s `SR_VertexProcessor.cpp`: the six-plane visibility test is
//! `face_visible` (line 397, returning an `SR_ClipStatus` this crate's `Visibility` enum
//! mirrors), and the Sutherland-Hodgman clip-against-each-edge-plus-fan-triangulate loop is
//! `SR_VertexProcessor::clip_and_process_tris` (line 760), whose `#if SR_Z_CLIPPING_ENABLED`
//! guard around the two Z clip edges is this crate's `z_clip` toggle.

use crate::math::Vec4;
use crate::shader::MAX_VARYINGS;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    FullyVisible,
    PartiallyVisible,
    NotVisible,
}

/// `(a, b, c, d)` such that a vertex `p` is inside the plane when `a*p.x + b*p.y + c*p.z +
/// d*p.w >= 0`. The four planes `±x <= w` and `±y <= w` are always active; the two `±z <= w`
/// planes are gated by `z_clip`.
const CLIP_PLANES: [[f32; 4]; 6] = [
    [-1.0, 0.0, 0.0, 1.0], // x <= w
    [1.0, 0.0, 0.0, 1.0],  // -x <= w
    [0.0, -1.0, 0.0, 1.0], // y <= w
    [0.0, 1.0, 0.0, 1.0],  // -y <= w
    [0.0, 0.0, -1.0, 1.0], // z <= w
    [0.0, 0.0, 1.0, 1.0],  // -z <= w
];

#[inline]
fn dist(plane: [f32; 4], p: [f32; 4]) -> f32 {
    plane[0] * p[0] + plane[1] * p[1] + plane[2] * p[2] + plane[3] * p[3]
}

fn active_planes(z_clip: bool) -> &'static [[f32; 4]] {
    if z_clip {
        &CLIP_PLANES[..]
    } else {
        &CLIP_PLANES[..4]
    }
}

/// Per-vertex clip-space position plus its interpolated varyings, carried through clipping.
#[derive(Clone)]
pub struct ClipVertex {
    pub pos: [f32; 4],
    pub varyings: [Vec4<f32>; MAX_VARYINGS],
}

impl ClipVertex {
    fn lerp(a: &ClipVertex, b: &ClipVertex, t: f32, num_varyings: usize) -> ClipVertex {
        let mut pos = [0.0f32; 4];
        for i in 0..4 {
            pos[i] = a.pos[i] + (b.pos[i] - a.pos[i]) * t;
        }
        let mut varyings = [Vec4::zero(); MAX_VARYINGS];
        for i in 0..num_varyings {
            varyings[i] = a.varyings[i] + (b.varyings[i] - a.varyings[i]) * t;
        }
        ClipVertex { pos, varyings }
    }
}

/// Classify a triangle's three clip-space vertices against the active planes, using the trivial
/// reject/accept tests: fully visible when every vertex is inside every plane, not visible when
/// some plane has all three vertices outside it, partially visible otherwise.
pub fn classify(verts: &[[f32; 4]; 3], z_clip: bool) -> Visibility {
    let planes = active_planes(z_clip);
    let mut all_inside = true;
    for &plane in planes {
        let outside_count = verts.iter().filter(|&&v| dist(plane, v) < 0.0).count();
        if outside_count == 3 {
            return Visibility::NotVisible;
        }
        if outside_count > 0 {
            all_inside = false;
        }
    }
    if all_inside {
        Visibility::FullyVisible
    } else {
        Visibility::PartiallyVisible
    }
}

/// Sutherland–Hodgman clip of `poly` against `plane`: emit the next vertex when it's inside;
/// emit the plane intersection whenever the edge crosses the plane.
fn clip_against_plane(poly: &[ClipVertex], plane: [f32; 4], num_varyings: usize) -> Vec<ClipVertex> {
    if poly.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(poly.len() + 1);
    for i in 0..poly.len() {
        let cur = &poly[i];
        let next = &poly[(i + 1) % poly.len()];
        let t_cur = dist(plane, cur.pos);
        let t_next = dist(plane, next.pos);
        let cur_in = t_cur >= 0.0;
        let next_in = t_next >= 0.0;

        if cur_in {
            out.push(cur.clone());
        }
        if cur_in != next_in {
            let t = t_cur / (t_cur - t_next);
            out.push(ClipVertex::lerp(cur, next, t, num_varyings));
        }
    }
    out
}

fn clip_polygon(mut poly: Vec<ClipVertex>, z_clip: bool, num_varyings: usize) -> Vec<ClipVertex> {
    for &plane in active_planes(z_clip) {
        poly = clip_against_plane(&poly, plane, num_varyings);
        if poly.len() < 3 {
            return Vec::new();
        }
    }
    poly
}

/// Fan-triangulate a convex polygon `[v0, v1, ..., vk]` into `k-1` triangles sharing `v0`.
fn fan_triangulate(poly: &[ClipVertex]) -> Vec<[ClipVertex; 3]> {
    let mut tris = Vec::with_capacity(poly.len().saturating_sub(2));
    for i in 1..poly.len() - 1 {
        tris.push([poly[0].clone(), poly[i].clone(), poly[i + 1].clone()]);
    }
    tris
}

/// Clip a triangle already known to be [`Visibility::PartiallyVisible`], returning zero or more
/// output triangles (fan-triangulated), or an empty vec if the clipped polygon degenerates below
/// 3 vertices.
pub fn clip_triangle(verts: [ClipVertex; 3], z_clip: bool, num_varyings: usize) -> Vec<[ClipVertex; 3]> {
    let poly = clip_polygon(verts.to_vec(), z_clip, num_varyings);
    if poly.len() < 3 {
        return Vec::new();
    }
    fan_triangulate(&poly)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vtx(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
        ClipVertex {
            pos: [x, y, z, w],
            varyings: [Vec4::zero(); MAX_VARYINGS],
        }
    }

    #[test]
    fn fully_inside_triangle_is_fully_visible() {
        let verts = [
            vtx(-0.5, -0.5, 0.0, 1.0).pos,
            vtx(0.5, -0.5, 0.0, 1.0).pos,
            vtx(0.0, 0.5, 0.0, 1.0).pos,
        ];
        assert_eq!(classify(&verts, true), Visibility::FullyVisible);
    }

    #[test]
    fn triangle_fully_beyond_one_plane_is_not_visible() {
        let verts = [
            vtx(2.0, 0.0, 0.0, 1.0).pos,
            vtx(3.0, 0.0, 0.0, 1.0).pos,
            vtx(2.5, 1.0, 0.0, 1.0).pos,
        ];
        assert_eq!(classify(&verts, true), Visibility::NotVisible);
    }

    #[test]
    fn straddling_triangle_clips_to_a_fan_of_at_least_one_triangle() {
        let verts = [vtx(-2.0, 0.0, 0.0, 1.0), vtx(0.5, -0.5, 0.0, 1.0), vtx(0.5, 0.5, 0.0, 1.0)];
        let positions = [verts[0].pos, verts[1].pos, verts[2].pos];
        assert_eq!(classify(&positions, true), Visibility::PartiallyVisible);
        let tris = clip_triangle(verts, true, 0);
        assert!(!tris.is_empty());
        for tri in &tris {
            for v in tri {
                assert!(dist(CLIP_PLANES[0], v.pos) >= -1e-4);
            }
        }
    }

    #[test]
    fn negative_w_vertex_produces_two_clipped_triangles() {
        // One vertex behind the eye (w < 0), two in front: clipping against all four x/y planes
        // plus the w>0 half-space implied by them should yield a quad, fan-triangulated to 2.
        let verts = [vtx(0.0, 0.0, 0.0, -1.0), vtx(0.5, -0.5, 0.0, 1.0), vtx(0.5, 0.5, 0.0, 1.0)];
        let positions = [verts[0].pos, verts[1].pos, verts[2].pos];
        assert_ne!(classify(&positions, true), Visibility::FullyVisible);
        let tris = clip_triangle(verts, true, 0);
        assert!(tris.len() <= 2);
    }
}
