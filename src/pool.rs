//! The worker pool: a fixed set of threads (the calling thread plus `n_threads - 1` spawned
//! ones) that jointly execute one draw call, then return control to the caller once every
//! fragment has retired. Grounded on `SR_ProcessorPool::num_threads`/`run_shader_processors`
//! for the pool-sizing and per-draw dispatch shape, and on euc's `render_par`
//! (`src/pipeline.rs`) for the `std::thread::scope` dispatch idiom and the "exclusive access to
//! disjoint regions, asserted by the caller" unsafe-aliasing pattern used to share render
//! targets across the scope's threads.

use core::sync::atomic::Ordering;
use std::thread;

use crate::bin::BinStore;
use crate::buffer::UniformBuffer;
use crate::framebuffer::MAX_COLOR_ATTACHMENTS;
use crate::mesh::{Mesh, PrimitiveMode};
use crate::shader::Shader;
use crate::stage::fragment::{self, RenderTargets};
use crate::stage::vertex::{self, PtvCache, VertexContext};
use crate::texture::Texture;
use crate::tile::{self, Rect};

/// A raw pointer wrapper asserting that the pointee is safe to access from multiple threads
/// because each thread's writes land on disjoint pixels (the scanline/subregion ownership
/// invariants enforced by [`tile::scanline_offset`] and [`tile::subregion`]).
struct SharedPtr<T>(*mut T);
unsafe impl<T> Send for SharedPtr<T> {}
unsafe impl<T> Sync for SharedPtr<T> {}
impl<T> SharedPtr<T> {
    unsafe fn view<'a>(&self) -> &'a mut T {
        &mut *self.0
    }
}

struct SharedTargets {
    color: [Option<SharedPtr<Texture>>; MAX_COLOR_ATTACHMENTS],
    depth: Option<SharedPtr<Texture>>,
}

impl SharedTargets {
    fn new(targets: &mut RenderTargets) -> Self {
        Self {
            color: core::array::from_fn(|i| targets.color[i].as_mut().map(|t| SharedPtr(*t as *mut Texture))),
            depth: targets.depth.as_mut().map(|t| SharedPtr(*t as *mut Texture)),
        }
    }

    unsafe fn view<'a>(&self) -> RenderTargets<'a> {
        RenderTargets {
            color: core::array::from_fn(|i| self.color[i].as_ref().map(|p| p.view())),
            depth: self.depth.as_ref().map(|p| p.view()),
        }
    }
}

/// Parameters for one synchronous draw, gathered by `Context::draw`.
pub struct DrawParams<'a> {
    pub uniforms: &'a UniformBuffer,
    pub vao: &'a crate::vertex_array::VertexArrayDescriptor,
    pub vbo: &'a crate::buffer::VertexBuffer,
    pub ibo: Option<&'a crate::buffer::IndexBuffer>,
    pub shader: &'a Shader,
    pub mesh: &'a Mesh,
    pub instance_id: usize,
    pub fb_width: u32,
    pub fb_height: u32,
    pub z_clip: bool,
    pub reversed_z: bool,
}

/// Run the drain protocol once for `producer`/`n`, rasterizing every
/// producer's currently-ready bins.
#[allow(clippy::too_many_arguments)]
fn drain_round(
    store: &BinStore,
    producer: usize,
    n: usize,
    shader: &Shader,
    uniforms: &UniformBuffer,
    wireframe: bool,
    fb_width: u32,
    fb_height: u32,
    reversed_z: bool,
    targets: &SharedTargets,
) {
    let tile = store.frag_semaphore.fetch_add(1, Ordering::AcqRel);
    store.set_ready(producer, tile as i32);

    for u in 0..n {
        while store.ready(u) < 0 {
            core::hint::spin_loop();
        }
        let mut view = unsafe { targets.view() };
        for bin in store.bins_of(u) {
            if wireframe {
                fragment::rasterize_bin_wireframe(shader, uniforms, bin, n as u32, producer as u32, fb_height, reversed_z, &mut view);
            } else {
                fragment::rasterize_bin(shader, uniforms, bin, n as u32, producer as u32, fb_width, fb_height, reversed_z, &mut view);
            }
        }
    }

    let departed = store.frag_semaphore.fetch_add(1, Ordering::AcqRel);
    if departed == 2 * n as u64 - 1 {
        store.reset_all();
        store.frag_semaphore.store(0, Ordering::Release);
    } else {
        while store.frag_semaphore.load(Ordering::Acquire) >= n as u64 {
            core::hint::spin_loop();
        }
    }
}

fn triangle_worker(id: usize, n: usize, params: &DrawParams, store: &BinStore, targets: &SharedTargets) {
    let ctx = VertexContext {
        uniforms: params.uniforms,
        vao: params.vao,
        vbo: params.vbo,
        ibo: params.ibo,
        shader: params.shader,
        fb_width: params.fb_width,
        fb_height: params.fb_height,
        z_clip: params.z_clip,
    };
    let range = tile::partition_indices(params.mesh.count, n, id, params.mesh.mode.vertices_per_primitive());
    let wireframe = params.mesh.mode.is_wireframe();

    // `BinStore` methods that mutate (`try_push`) take `&mut self` in their public signature to
    // discourage careless concurrent use, but producer slices are disjoint per thread; treat the
    // shared reference as exclusive-per-producer the same way `SharedTargets` does for pixels.
    let store_mut = unsafe { &mut *(store as *const BinStore as *mut BinStore) };

    vertex::run_triangle_partition(&ctx, params.mesh, range, id, params.instance_id, store_mut, |s, producer| {
        drain_round(s, producer, n, params.shader, params.uniforms, wireframe, params.fb_width, params.fb_height, params.reversed_z, targets);
    });

    // End-of-vertex-work flush: push whatever's left, then announce this producer's final
    // (possibly empty) round so other threads' drains aren't starved waiting on us forever.
    drain_round(store, id, n, params.shader, params.uniforms, wireframe, params.fb_width, params.fb_height, params.reversed_z, targets);

    store.busy_semaphore.fetch_sub(1, Ordering::AcqRel);
    while store.busy_semaphore.load(Ordering::Acquire) > 0 {
        drain_round(store, id, n, params.shader, params.uniforms, wireframe, params.fb_width, params.fb_height, params.reversed_z, targets);
    }
}

fn point_line_worker(id: usize, n: usize, params: &DrawParams, targets: &SharedTargets) {
    let ctx = VertexContext {
        uniforms: params.uniforms,
        vao: params.vao,
        vbo: params.vbo,
        ibo: params.ibo,
        shader: params.shader,
        fb_width: params.fb_width,
        fb_height: params.fb_height,
        z_clip: false,
    };
    let subregion: Rect = tile::subregion(params.fb_width, params.fb_height, n as u32, id as u32);
    let verts = params.mesh.mode.vertices_per_primitive();
    let num_prims = params.mesh.count / verts;
    let mut cache = PtvCache::new(32);
    let mut view = unsafe { targets.view() };

    for p in 0..num_prims {
        let ids = vertex::fetch_primitive_ids(params.mesh.mode, ctx.ibo, params.mesh.first, p);
        let shaded: Vec<_> = ids.iter().map(|&vid| vertex::shade_vertex(&ctx, vid, params.instance_id, &mut cache)).collect();
        if shaded.iter().any(|v| !v.clip_pos[3].is_finite() || v.clip_pos[3] == 0.0) {
            continue;
        }
        let screen: Vec<[f32; 4]> = shaded.iter().map(|v| screen_map_pub(v.clip_pos, params.fb_width, params.fb_height)).collect();

        match params.mesh.mode {
            PrimitiveMode::Points | PrimitiveMode::IndexedPoints => {
                fragment::draw_point(params.shader, params.uniforms, screen[0], &shaded[0].varyings, subregion, params.reversed_z, &mut view);
            }
            PrimitiveMode::Lines | PrimitiveMode::IndexedLines => {
                fragment::draw_line(
                    params.shader,
                    params.uniforms,
                    screen[0],
                    screen[1],
                    &shaded[0].varyings,
                    &shaded[1].varyings,
                    params.shader.num_varyings as usize,
                    subregion,
                    params.reversed_z,
                    &mut view,
                );
            }
            _ => unreachable!("point_line_worker invoked with a triangle-like mode"),
        }
    }
}

/// Re-exposed screen mapping so the point/line path (which bypasses the triangle vertex
/// pipeline's clip/bin plumbing) can reuse the exact same perspective-divide-plus-viewport math.
fn screen_map_pub(clip_pos: [f32; 4], fb_width: u32, fb_height: u32) -> [f32; 4] {
    let w = clip_pos[3];
    let inv_w = 1.0 / w;
    let x = ((clip_pos[0] * inv_w + 1.0) * fb_width as f32 * 0.5).max(0.0).floor();
    let y = ((clip_pos[1] * inv_w + 1.0) * fb_height as f32 * 0.5).max(0.0).floor();
    [x, y, clip_pos[2] * inv_w, inv_w]
}

/// A fixed-size set of cooperating threads; the calling thread always runs one share of the
/// work inline rather than sitting idle while spawned threads do it.
pub struct WorkerPool {
    n_threads: usize,
}

impl WorkerPool {
    pub fn new(n_threads: usize) -> Self {
        let n = n_threads.max(1);
        log::debug!("worker pool sized to {n} threads");
        Self { n_threads: n }
    }

    pub fn num_threads(&self) -> usize {
        self.n_threads
    }

    pub fn set_num_threads(&mut self, n_threads: usize) -> usize {
        let n = n_threads.max(1);
        if n != self.n_threads {
            log::debug!("worker pool resized {} -> {n} threads", self.n_threads);
            self.n_threads = n;
        }
        self.n_threads
    }

    /// Run one synchronous draw. `store` must already be sized for `self.n_threads` (the caller,
    /// `Context`, rebuilds it on a thread-count change).
    pub fn draw(&self, params: &DrawParams, store: &mut BinStore, targets: &mut RenderTargets) {
        debug_assert_eq!(store.n_threads(), self.n_threads);
        store.reset_busy();
        let n = self.n_threads;
        let shared_targets = SharedTargets::new(targets);
        let triangle_like = fragment::mode_is_triangle_like(params.mesh.mode);

        thread::scope(|s| {
            for id in 1..n {
                let shared_targets = &shared_targets;
                let store: &BinStore = &*store;
                s.spawn(move || {
                    if triangle_like {
                        triangle_worker(id, n, params, store, shared_targets);
                    } else {
                        point_line_worker(id, n, params, shared_targets);
                    }
                });
            }
            if triangle_like {
                triangle_worker(0, n, params, store, &shared_targets);
            } else {
                point_line_worker(0, n, params, &shared_targets);
            }
        });
    }
}
