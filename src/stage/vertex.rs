//! The vertex stage: per-thread index fetch, vertex program invocation, backface culling,
//! homogeneous clip classification/clipping, perspective divide, screen mapping, and fragment
//! bin emission.
//!
//! Grounded on `SR_VertexProcessor`'s vertex-to-screen pipeline, generalized from its
//! fixed C-struct pipeline into a handful of free functions operating on borrowed resource
//! references, so the same code serves both the triangle path (which bins for the fragment
//! stage) and the simplified point/line paths (driven directly by
//! [`crate::stage::fragment`]).

use crate::bin::FragmentBin;
use crate::buffer::{IndexBuffer, IndexType, VertexBuffer};
use crate::clip::{self, ClipVertex, Visibility};
use crate::math::{barycentric_planes, Vec2, Vec4};
use crate::mesh::{Mesh, PrimitiveMode};
use crate::shader::{CullMode, Shader, VertexParam, MAX_VARYINGS};
use crate::vertex_array::VertexArrayDescriptor;

/// Everything the vertex stage needs to shade and assemble primitives for one draw call.
pub struct VertexContext<'a> {
    pub uniforms: &'a crate::buffer::UniformBuffer,
    pub vao: &'a VertexArrayDescriptor,
    pub vbo: &'a VertexBuffer,
    pub ibo: Option<&'a IndexBuffer>,
    pub shader: &'a Shader,
    pub fb_width: u32,
    pub fb_height: u32,
    pub z_clip: bool,
}

/// A vertex shaded once: its clip-space position plus varyings.
#[derive(Clone)]
pub struct ShadedVertex {
    pub clip_pos: [f32; 4],
    pub varyings: [Vec4<f32>; MAX_VARYINGS],
}

/// Direct-mapped post-transform-vertex cache, keyed by `vert_id % size`. Purely an
/// optimization — disabling it (size 0) cannot change rendered output.
pub struct PtvCache {
    size: usize,
    slots: Vec<Option<(usize, ShadedVertex)>>,
}

impl PtvCache {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            slots: (0..size).map(|_| None).collect(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    fn lookup(&self, vert_id: usize) -> Option<&ShadedVertex> {
        if self.size == 0 {
            return None;
        }
        match &self.slots[vert_id % self.size] {
            Some((id, v)) if *id == vert_id => Some(v),
            _ => None,
        }
    }

    fn insert(&mut self, vert_id: usize, v: ShadedVertex) {
        if self.size == 0 {
            return;
        }
        self.slots[vert_id % self.size] = Some((vert_id, v));
    }
}

/// Invoke the shader's vertex program for `vert_id`, consulting/populating `cache` first.
pub fn shade_vertex(ctx: &VertexContext, vert_id: usize, instance_id: usize, cache: &mut PtvCache) -> ShadedVertex {
    if let Some(hit) = cache.lookup(vert_id) {
        return hit.clone();
    }
    let mut varyings_out = [Vec4::zero(); MAX_VARYINGS];
    let clip_pos = (ctx.shader.vertex)(VertexParam {
        uniforms: ctx.uniforms,
        vert_id,
        instance_id,
        vao: ctx.vao,
        vbo: ctx.vbo,
        varyings_out: &mut varyings_out,
    });
    let shaded = ShadedVertex { clip_pos, varyings: varyings_out };
    cache.insert(vert_id, shaded.clone());
    shaded
}

/// Fetch the `prim_index`-th primitive's vertex ids, honoring indexed vs. non-indexed modes.
pub fn fetch_primitive_ids(mode: PrimitiveMode, ibo: Option<&IndexBuffer>, first: usize, prim_index: usize) -> Vec<usize> {
    let verts = mode.vertices_per_primitive();
    let base = first + prim_index * verts;
    if mode.is_indexed() {
        let ibo = ibo.expect("indexed primitive mode requires an index buffer");
        (0..verts).map(|i| ibo.get(base + i) as usize).collect()
    } else {
        (0..verts).map(|i| base + i).collect()
    }
}

/// Sign of the homogeneous determinant `det(p0.xyw, p1.xyw, p2.xyw)`; used for backface culling
/// before perspective divide. Computed directly on the undivided `(x, y, w)` triples rather than
/// dividing by `w` first — dividing first flips the sign whenever an odd number of vertices carry
/// negative `w` (a triangle straddling the `w = 0` plane), which would silently invert culling for
/// exactly the geometry clip classification exists to handle.
fn backface_sign(p0: [f32; 4], p1: [f32; 4], p2: [f32; 4]) -> f32 {
    let a = [p0[0], p0[1], p0[3]];
    let b = [p1[0], p1[1], p1[3]];
    let c = [p2[0], p2[1], p2[3]];
    a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0]) + a[2] * (b[0] * c[1] - b[1] * c[0])
}

fn should_cull(sign: f32, cull_mode: CullMode) -> bool {
    match cull_mode {
        CullMode::Off => false,
        CullMode::Back => sign <= 0.0,
        CullMode::Front => sign >= 0.0,
    }
}

/// Perspective divide `(x,y,z,w) -> (x/w, y/w, z/w, 1/w)` then map `x, y` to pixel coordinates.
fn screen_map(clip_pos: [f32; 4], fb_width: u32, fb_height: u32) -> [f32; 4] {
    let w = clip_pos[3];
    let inv_w = 1.0 / w;
    let ndc_x = clip_pos[0] * inv_w;
    let ndc_y = clip_pos[1] * inv_w;
    let ndc_z = clip_pos[2] * inv_w;
    let x = ((ndc_x + 1.0) * fb_width as f32 * 0.5).max(0.0).floor();
    let y = ((ndc_y + 1.0) * fb_height as f32 * 0.5).max(0.0).floor();
    [x, y, ndc_z, inv_w]
}

/// Build a [`FragmentBin`] from three already screen-mapped vertices, or `None` if the triangle
/// is degenerate (zero barycentric denominator) or its bounding box misses the framebuffer /
/// is sub-pixel.
fn build_bin(screen: [[f32; 4]; 3], varyings: [[Vec4<f32>; MAX_VARYINGS]; 3], num_varyings: u8, fb_width: u32, fb_height: u32) -> Option<FragmentBin> {
    let p0 = Vec2::new(screen[0][0], screen[0][1]);
    let p1 = Vec2::new(screen[1][0], screen[1][1]);
    let p2 = Vec2::new(screen[2][0], screen[2][1]);

    let denom = (p0.x - p2.x) * (p1.y - p0.y) - (p0.x - p1.x) * (p2.y - p0.y);
    if denom == 0.0 {
        return None;
    }

    let min_x = p0.x.min(p1.x).min(p2.x);
    let max_x = p0.x.max(p1.x).max(p2.x);
    let min_y = p0.y.min(p1.y).min(p2.y);
    let max_y = p0.y.max(p1.y).max(p2.y);
    if max_x < 0.0 || max_y < 0.0 || min_x >= fb_width as f32 || min_y >= fb_height as f32 {
        return None;
    }
    if (max_x - min_x) < 1.0 || (max_y - min_y) < 1.0 {
        return None;
    }

    let planes = barycentric_planes(p0, p1, p2);
    Some(FragmentBin {
        screen,
        planes,
        varyings,
        num_varyings,
        num_verts: 3,
    })
}

/// Shade, cull, clip, screen-map, and bin one triangle primitive. Returns the (possibly
/// fan-triangulated) set of bins to push; empty if the triangle is culled, fully clipped away,
/// or degenerate.
pub fn process_triangle(ctx: &VertexContext, ids: &[usize], instance_id: usize, cache: &mut PtvCache) -> Vec<FragmentBin> {
    let num_varyings = ctx.shader.num_varyings as usize;
    let shaded: Vec<ShadedVertex> = ids.iter().map(|&id| shade_vertex(ctx, id, instance_id, cache)).collect();

    if shaded.iter().any(|v| !v.clip_pos[3].is_finite() || v.clip_pos[3] == 0.0) {
        return Vec::new();
    }

    let positions = [shaded[0].clip_pos, shaded[1].clip_pos, shaded[2].clip_pos];
    let sign = backface_sign(positions[0], positions[1], positions[2]);
    if should_cull(sign, ctx.shader.cull_mode) {
        return Vec::new();
    }

    let visibility = clip::classify(&positions, ctx.z_clip);
    if visibility == Visibility::NotVisible {
        return Vec::new();
    }

    let triangles: Vec<[ClipVertex; 3]> = if visibility == Visibility::FullyVisible {
        vec![[
            ClipVertex { pos: positions[0], varyings: shaded[0].varyings },
            ClipVertex { pos: positions[1], varyings: shaded[1].varyings },
            ClipVertex { pos: positions[2], varyings: shaded[2].varyings },
        ]]
    } else {
        let verts = [
            ClipVertex { pos: positions[0], varyings: shaded[0].varyings },
            ClipVertex { pos: positions[1], varyings: shaded[1].varyings },
            ClipVertex { pos: positions[2], varyings: shaded[2].varyings },
        ];
        clip::clip_triangle(verts, ctx.z_clip, num_varyings)
    };

    let mut bins = Vec::with_capacity(triangles.len());
    for tri in &triangles {
        let screen = [
            screen_map(tri[0].pos, ctx.fb_width, ctx.fb_height),
            screen_map(tri[1].pos, ctx.fb_width, ctx.fb_height),
            screen_map(tri[2].pos, ctx.fb_width, ctx.fb_height),
        ];
        let varyings = [tri[0].varyings, tri[1].varyings, tri[2].varyings];
        if let Some(bin) = build_bin(screen, varyings, ctx.shader.num_varyings, ctx.fb_width, ctx.fb_height) {
            bins.push(bin);
        }
    }
    bins
}

/// Run this thread's partition of a mesh's triangle primitives, pushing bins into `store` at
/// `producer` and invoking `flush` whenever the ring would overflow.
pub fn run_triangle_partition(
    ctx: &VertexContext,
    mesh: &Mesh,
    range: core::ops::Range<usize>,
    producer: usize,
    instance_id: usize,
    store: &mut crate::bin::BinStore,
    mut flush: impl FnMut(&mut crate::bin::BinStore, usize),
) {
    let verts = mesh.mode.vertices_per_primitive();
    debug_assert_eq!(range.len() % verts, 0);
    let mut cache = PtvCache::new(32);
    let num_prims = range.len() / verts;
    let prim_first = range.start / verts;

    for p in 0..num_prims {
        let ids = fetch_primitive_ids(mesh.mode, ctx.ibo, mesh.first, prim_first + p);
        for bin in process_triangle(ctx, &ids, instance_id, &mut cache) {
            if !store.try_push(producer, bin.clone()) {
                flush(store, producer);
                let pushed = store.try_push(producer, bin);
                debug_assert!(pushed, "bin ring still full immediately after flush");
            }
        }
    }
}
