//! The fragment stage: scanline traversal of binned triangles, the simplified point/line draw
//! paths, depth testing, perspective-corrected varying interpolation, and blending.
//!
//! Grounded on `SR_FragmentProcessor`'s scanline-fill loop (`SR_FragmentProcessor.cpp`, the
//! `SR_ScanlineBounds`-driven `for (y ...)` / barycentric-`dot` loops), with the drain protocol's
//! scanline ownership (`crate::tile::scanline_offset`) matching that file's own
//! `sr_scanline_offset` use, and the point/line paths grounded on that same file's
//! `render_point`/`render_line`/`sr_clip_liang_barsky`, generalized from euc's
//! `rasterizer/lines.rs` DDA shape (which this crate adapts to per-thread subregion clipping
//! instead of a single-threaded `Target`).

use crate::bin::FragmentBin;
use crate::buffer::UniformBuffer;
use crate::math::{lerp2, lerp3, Vec4};
use crate::mesh::PrimitiveMode;
use crate::shader::{BlendMode, DepthCompare, FragCoord, FragmentParam, Shader, MAX_OUTPUTS, MAX_VARYINGS};
use crate::texture::Texture;
use crate::tile::{scanline_offset, Rect};

/// Mutable access to one draw's render targets, borrowed for the duration of the draw.
pub struct RenderTargets<'a> {
    pub color: [Option<&'a mut Texture>; crate::framebuffer::MAX_COLOR_ATTACHMENTS],
    pub depth: Option<&'a mut Texture>,
}

/// Per-thread cap on how many depth-tested fragments accumulate before a batched shader
/// invocation, matching `SR_SHADER_MAX_QUEUED_FRAGS`.
pub const MAX_QUEUED_FRAGS: usize = 4096;

/// One depth-tested, not-yet-shaded fragment: packed screen coordinates, interpolated
/// `(z, w^-1)`, and the perspective-corrected barycentric weights used to interpolate varyings
/// at flush time.
#[derive(Clone, Copy)]
struct QueuedFrag {
    xy_packed: u32,
    z: f32,
    bc: [f32; 3],
}

/// A thread's staging area between depth-testing a scanline's pixels and invoking the fragment
/// program on the survivors in a batch, per spec's `Fragment queue`.
struct FragmentQueue {
    entries: Vec<QueuedFrag>,
}

impl FragmentQueue {
    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_QUEUED_FRAGS),
        }
    }

    #[inline]
    fn push(&mut self, x: u32, y: u32, z: f32, bc: [f32; 3]) -> bool {
        debug_assert!(self.entries.len() <= MAX_QUEUED_FRAGS);
        self.entries.push(QueuedFrag {
            xy_packed: (x << 16) | (y & 0xffff),
            z,
            bc,
        });
        self.entries.len() >= MAX_QUEUED_FRAGS
    }

    fn flush(&mut self, shader: &Shader, uniforms: &UniformBuffer, bin: &FragmentBin, targets: &mut RenderTargets) {
        for frag in self.entries.drain(..) {
            let x = frag.xy_packed >> 16;
            let y = frag.xy_packed & 0xffff;
            shade_and_commit(shader, uniforms, bin, x, y, frag.z, frag.bc, targets);
        }
    }
}

fn depth_read(depth: &Option<&mut Texture>, x: u32, y: u32) -> f32 {
    match depth {
        Some(tex) => tex.read_rgba_f32(x, y, 0)[0],
        None => f32::INFINITY,
    }
}

fn depth_write(depth: &mut Option<&mut Texture>, x: u32, y: u32, z: f32) {
    if let Some(tex) = depth {
        tex.write_rgba_f32(x, y, 0, [z, z, z, z]);
    }
}

fn blend_store(targets: &mut RenderTargets, slot: usize, x: u32, y: u32, src: Vec4<f32>, mode: BlendMode) {
    let Some(tex) = targets.color[slot].as_mut() else { return };
    let s = [src.x, src.y, src.z, src.w];
    let d = tex.read_rgba_f32(x, y, 0);
    let a = s[3];
    let out = match mode {
        BlendMode::Off => s,
        BlendMode::Alpha => [s[0] * a + d[0] * (1.0 - a), s[1] * a + d[1] * (1.0 - a), s[2] * a + d[2] * (1.0 - a), a + d[3] * (1.0 - a)],
        BlendMode::PremulAlpha => [s[0] + d[0] * (1.0 - a), s[1] + d[1] * (1.0 - a), s[2] + d[2] * (1.0 - a), a + d[3] * (1.0 - a)],
        BlendMode::Additive => [(s[0] + d[0]).min(1.0), (s[1] + d[1]).min(1.0), (s[2] + d[2]).min(1.0), (s[3] + d[3]).min(1.0)],
        BlendMode::Screen => [
            1.0 - (1.0 - s[0]) * (1.0 - d[0]),
            1.0 - (1.0 - s[1]) * (1.0 - d[1]),
            1.0 - (1.0 - s[2]) * (1.0 - d[2]),
            1.0 - (1.0 - s[3]) * (1.0 - d[3]),
        ],
    };
    tex.write_rgba_f32(x, y, 0, out);
}

/// Interpolate varying `i` across a triangle's three vertices with perspective-corrected weights.
#[inline]
fn interpolate_varying(bin: &FragmentBin, i: usize, bc: [f32; 3]) -> Vec4<f32> {
    lerp3(bin.varyings[0][i], bin.varyings[1][i], bin.varyings[2][i], bc[0], bc[1], bc[2])
}

/// Invoke the shader's fragment program at `(x, y)` with precomputed perspective-correct `bc`
/// and interpolated `z`, then shade and blend/store the result. The depth test has already run
/// (it gates queue admission, per the fragment queue's contract) so it is not repeated here.
#[allow(clippy::too_many_arguments)]
fn shade_and_commit(shader: &Shader, uniforms: &UniformBuffer, bin: &FragmentBin, x: u32, y: u32, z: f32, bc: [f32; 3], targets: &mut RenderTargets) {
    let mut varyings_in = [Vec4::zero(); MAX_VARYINGS];
    for i in 0..bin.num_varyings as usize {
        varyings_in[i] = interpolate_varying(bin, i, bc);
    }
    let mut outputs_out = [Vec4::zero(); MAX_OUTPUTS];
    let keep = (shader.fragment)(FragmentParam {
        coord: FragCoord { x: x as u16, y: y as u16, z },
        uniforms,
        varyings_in: &varyings_in,
        outputs_out: &mut outputs_out,
    });
    if !keep {
        return;
    }

    for slot in 0..targets.color.len().min(MAX_OUTPUTS) {
        if targets.color[slot].is_some() {
            blend_store(targets, slot, x, y, outputs_out[slot], shader.blend_mode);
        }
    }
    if shader.depth_write {
        depth_write(&mut targets.depth, x, y, z);
    }
}

/// Walk one triangle bin's scanlines owned by `thread_id` of `n_threads`, shading and committing
/// every covered pixel, using edge-selection and perspective-correct interpolation.
#[allow(clippy::too_many_arguments)]
pub fn rasterize_bin(
    shader: &Shader,
    uniforms: &UniformBuffer,
    bin: &FragmentBin,
    n_threads: u32,
    thread_id: u32,
    fb_width: u32,
    fb_height: u32,
    reversed_z: bool,
    targets: &mut RenderTargets,
) {
    let ys: [f32; 3] = [bin.screen[0][1], bin.screen[1][1], bin.screen[2][1]];
    let y_min = ys[0].min(ys[1]).min(ys[2]).max(0.0) as u32;
    let y_max = (ys[0].max(ys[1]).max(ys[2]).min(fb_height as f32 - 1.0)) as i64;
    if y_max < y_min as i64 {
        return;
    }

    let xs: [f32; 3] = [bin.screen[0][0], bin.screen[1][0], bin.screen[2][0]];
    let bbox_max_x = xs[0].max(xs[1]).max(xs[2]).min(fb_width as f32 - 1.0);
    let bbox_min_x = xs[0].min(xs[1]).min(xs[2]).max(0.0);

    let mut queue = FragmentQueue::new();
    let start = y_min + scanline_offset(n_threads, thread_id, y_min);
    let mut y = start as i64;
    while y <= y_max {
        let yf = y as f32;
        // Intersect every non-horizontal edge against this scanline; for a triangle with a
        // distinct top/mid/bottom vertex exactly two edges cross any given y, giving the same
        // x-range an explicit top/mid edge-pair selection would.
        let mut edge_xs = Vec::with_capacity(2);
        let edges = [(0usize, 1usize), (1, 2), (2, 0)];
        for (a, b) in edges {
            let (ya, yb) = (bin.screen[a][1], bin.screen[b][1]);
            if (yf >= ya.min(yb)) && (yf <= ya.max(yb)) && ya != yb {
                let t = (yf - ya) / (yb - ya);
                edge_xs.push(bin.screen[a][0] + t * (bin.screen[b][0] - bin.screen[a][0]));
            }
        }
        if edge_xs.len() >= 2 {
            let x_min = edge_xs.iter().cloned().fold(f32::INFINITY, f32::min).max(bbox_min_x).max(0.0);
            let x_max = edge_xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max).min(bbox_max_x);

            let mut x = x_min.ceil() as i64;
            let x_max_i = x_max.floor() as i64;
            while x <= x_max_i {
                let xf = x as f32;
                let bc_raw = [
                    bin.planes[0].eval(xf, yf),
                    bin.planes[1].eval(xf, yf),
                    bin.planes[2].eval(xf, yf),
                ];
                let inv_w = [bin.screen[0][3], bin.screen[1][3], bin.screen[2][3]];
                let w_interp = bc_raw[0] * inv_w[0] + bc_raw[1] * inv_w[1] + bc_raw[2] * inv_w[2];
                let z = bc_raw[0] * bin.screen[0][2] + bc_raw[1] * bin.screen[1][2] + bc_raw[2] * bin.screen[2][2];
                let bc_p = [
                    bc_raw[0] * inv_w[0] / w_interp,
                    bc_raw[1] * inv_w[1] / w_interp,
                    bc_raw[2] * inv_w[2] / w_interp,
                ];
                let old_z = depth_read(&targets.depth, x as u32, y as u32);
                if shader.depth_test.passes(z, old_z, reversed_z) && queue.push(x as u32, y as u32, z, bc_p) {
                    queue.flush(shader, uniforms, bin, targets);
                }
                x += 1;
            }
        }
        y += n_threads as i64;
    }
    queue.flush(shader, uniforms, bin, targets);
}

/// Point rendering: a single point-in-rect test (clipped to this thread's subregion) plus depth
/// test, shading, and commit. No binning is involved.
#[allow(clippy::too_many_arguments)]
pub fn draw_point(
    shader: &Shader,
    uniforms: &UniformBuffer,
    screen: [f32; 4],
    varyings: &[Vec4<f32>; MAX_VARYINGS],
    subregion: Rect,
    reversed_z: bool,
    targets: &mut RenderTargets,
) {
    let x = screen[0] as i64;
    let y = screen[1] as i64;
    if x < subregion.x0 as i64 || x >= subregion.x1 as i64 || y < subregion.y0 as i64 || y >= subregion.y1 as i64 {
        return;
    }
    let z = screen[2];
    let old_z = depth_read(&targets.depth, x as u32, y as u32);
    if !shader.depth_test.passes(z, old_z, reversed_z) {
        return;
    }
    let mut outputs_out = [Vec4::zero(); MAX_OUTPUTS];
    let keep = (shader.fragment)(FragmentParam {
        coord: FragCoord { x: x as u16, y: y as u16, z },
        uniforms,
        varyings_in: varyings,
        outputs_out: &mut outputs_out,
    });
    if !keep {
        return;
    }
    for slot in 0..targets.color.len().min(MAX_OUTPUTS) {
        if targets.color[slot].is_some() {
            blend_store(targets, slot, x as u32, y as u32, outputs_out[slot], shader.blend_mode);
        }
    }
    if shader.depth_write {
        depth_write(&mut targets.depth, x as u32, y as u32, z);
    }
}

/// Liang-Barsky clip of the 2D segment `(x0,y0)-(x1,y1)` against `rect`. Returns the clipped
/// `(t0, t1) in [0,1]` parameter range, or `None` if the segment misses the rect entirely.
fn liang_barsky(x0: f32, y0: f32, x1: f32, y1: f32, rect: Rect) -> Option<(f32, f32)> {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    let checks = [
        (-dx, x0 - rect.x0 as f32),
        (dx, rect.x1 as f32 - x0),
        (-dy, y0 - rect.y0 as f32),
        (dy, rect.y1 as f32 - y0),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                if r > t0 {
                    t0 = r;
                }
            } else {
                if r < t0 {
                    return None;
                }
                if r < t1 {
                    t1 = r;
                }
            }
        }
    }
    if t0 > t1 {
        None
    } else {
        Some((t0, t1))
    }
}

/// Line rendering: fixed-point DDA across the segment clipped (via Liang-Barsky) to this
/// thread's subregion, linearly interpolating varyings along the line parameter.
pub fn draw_line(
    shader: &Shader,
    uniforms: &UniformBuffer,
    a: [f32; 4],
    b: [f32; 4],
    varyings_a: &[Vec4<f32>; MAX_VARYINGS],
    varyings_b: &[Vec4<f32>; MAX_VARYINGS],
    num_varyings: usize,
    subregion: Rect,
    reversed_z: bool,
    targets: &mut RenderTargets,
) {
    let Some((t0, t1)) = liang_barsky(a[0], a[1], b[0], b[1], subregion) else {
        return;
    };
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let steps = dx.abs().max(dy.abs()).max(1.0) * (t1 - t0);
    let n = steps.round().max(1.0) as u32;

    for i in 0..=n {
        let t = t0 + (t1 - t0) * (i as f32 / n as f32);
        let x = a[0] + dx * t;
        let y = a[1] + dy * t;
        let z = a[2] + (b[2] - a[2]) * t;
        let xi = x.round() as i64;
        let yi = y.round() as i64;
        if xi < subregion.x0 as i64 || xi >= subregion.x1 as i64 || yi < subregion.y0 as i64 || yi >= subregion.y1 as i64 {
            continue;
        }
        let old_z = depth_read(&targets.depth, xi as u32, yi as u32);
        if !shader.depth_test.passes(z, old_z, reversed_z) {
            continue;
        }
        let mut varyings_in = [Vec4::zero(); MAX_VARYINGS];
        for v in 0..num_varyings {
            varyings_in[v] = lerp2(varyings_a[v], varyings_b[v], 1.0 - t, t);
        }
        let mut outputs_out = [Vec4::zero(); MAX_OUTPUTS];
        let keep = (shader.fragment)(FragmentParam {
            coord: FragCoord { x: xi as u16, y: yi as u16, z },
            uniforms,
            varyings_in: &varyings_in,
            outputs_out: &mut outputs_out,
        });
        if !keep {
            continue;
        }
        for slot in 0..targets.color.len().min(MAX_OUTPUTS) {
            if targets.color[slot].is_some() {
                blend_store(targets, slot, xi as u32, yi as u32, outputs_out[slot], shader.blend_mode);
            }
        }
        if shader.depth_write {
            depth_write(&mut targets.depth, xi as u32, yi as u32, z);
        }
    }
}

/// `tri_wire`: rasterize only the scanline's left and right boundary x-endpoints of the filled
/// triangle, per the literal scanline-boundary definition (not three clipped line segments).
#[allow(clippy::too_many_arguments)]
pub fn rasterize_bin_wireframe(
    shader: &Shader,
    uniforms: &UniformBuffer,
    bin: &FragmentBin,
    n_threads: u32,
    thread_id: u32,
    fb_height: u32,
    reversed_z: bool,
    targets: &mut RenderTargets,
) {
    let ys: [f32; 3] = [bin.screen[0][1], bin.screen[1][1], bin.screen[2][1]];
    let y_min = ys[0].min(ys[1]).min(ys[2]).max(0.0) as u32;
    let y_max = (ys[0].max(ys[1]).max(ys[2]).min(fb_height as f32 - 1.0)) as i64;
    if y_max < y_min as i64 {
        return;
    }
    let start = y_min + scanline_offset(n_threads, thread_id, y_min);
    let mut y = start as i64;
    while y <= y_max {
        let yf = y as f32;
        let edges = [(0usize, 1usize), (1, 2), (2, 0)];
        let mut edge_xs = Vec::with_capacity(2);
        for (a, b) in edges {
            let (ya, yb) = (bin.screen[a][1], bin.screen[b][1]);
            if (yf >= ya.min(yb)) && (yf <= ya.max(yb)) && ya != yb {
                let t = (yf - ya) / (yb - ya);
                edge_xs.push(bin.screen[a][0] + t * (bin.screen[b][0] - bin.screen[a][0]));
            }
        }
        if edge_xs.len() >= 2 {
            for &xf in &[edge_xs.iter().cloned().fold(f32::INFINITY, f32::min), edge_xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max)] {
                let x = xf.round();
                let bc_raw = [bin.planes[0].eval(x, yf), bin.planes[1].eval(x, yf), bin.planes[2].eval(x, yf)];
                let inv_w = [bin.screen[0][3], bin.screen[1][3], bin.screen[2][3]];
                let w_interp = bc_raw[0] * inv_w[0] + bc_raw[1] * inv_w[1] + bc_raw[2] * inv_w[2];
                let z = bc_raw[0] * bin.screen[0][2] + bc_raw[1] * bin.screen[1][2] + bc_raw[2] * bin.screen[2][2];
                let bc_p = [bc_raw[0] * inv_w[0] / w_interp, bc_raw[1] * inv_w[1] / w_interp, bc_raw[2] * inv_w[2] / w_interp];
                let old_z = depth_read(&targets.depth, x as u32, y as u32);
                if shader.depth_test.passes(z, old_z, reversed_z) {
                    shade_and_commit(shader, uniforms, bin, x as u32, y as u32, z, bc_p, targets);
                }
            }
        }
        y += n_threads as i64;
    }
}

pub fn mode_is_triangle_like(mode: PrimitiveMode) -> bool {
    matches!(
        mode,
        PrimitiveMode::Triangles | PrimitiveMode::IndexedTriangles | PrimitiveMode::TriangleWireframe | PrimitiveMode::IndexedTriangleWireframe
    )
}
