//! `Context`: the sole public entry point. Owns every resource pool, the worker pool, and the
//! shared bin store, and exposes resource creation and draw submission as fallible methods.
//!
//! Grounded on the C++ original's `SR_Context` (a forest of resource tables rooted at one
//! owner, no cyclic references) and on euc's split between a `Pipeline` (shader +
//! state) and a `Target` (framebuffer) — generalized here into handle-addressed tables so one
//! `Context` can hold many of each resource instead of one compile-time pair.

use crate::bin::BinStore;
use crate::buffer::{IndexBuffer, IndexType, UniformBuffer, VertexBuffer};
use crate::error::{Error, Result};
use crate::framebuffer::Framebuffer;
use crate::handle::{Handle, Pool};
use crate::mesh::Mesh;
use crate::pool::{DrawParams, WorkerPool};
use crate::shader::{Shader, MAX_OUTPUTS, MAX_VARYINGS};
use crate::stage::fragment::RenderTargets;
use crate::texture::{PixelFormat, Texture, TexelOrder};
use crate::vertex_array::{AttribBinding, ScalarType, VertexArrayDescriptor};

/// The resource store plus the worker pool tying every stage together. Not `Sync`: a `Context`
/// must not be shared across threads while a `draw` is in flight, nor resized/mutated
/// concurrently with one — a documented precondition that each framebuffer has a single writer
/// at a time, not an enforced lock.
pub struct Context {
    vbos: Pool<VertexBuffer>,
    ibos: Pool<IndexBuffer>,
    ubos: Pool<UniformBuffer>,
    textures: Pool<Texture>,
    vaos: Pool<VertexArrayDescriptor>,
    framebuffers: Pool<Framebuffer>,
    shaders: Pool<Shader>,
    pool: WorkerPool,
    bin_store: BinStore,
    z_clip: bool,
    reversed_z: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let n = num_cpus::get().max(1);
        log::debug!("context created with {n} worker threads");
        Self {
            vbos: Pool::default(),
            ibos: Pool::default(),
            ubos: Pool::default(),
            textures: Pool::default(),
            vaos: Pool::default(),
            framebuffers: Pool::default(),
            shaders: Pool::default(),
            pool: WorkerPool::new(n),
            bin_store: BinStore::new(n),
            z_clip: true,
            reversed_z: false,
        }
    }

    // -- thread pool ---------------------------------------------------

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    pub fn set_num_threads(&mut self, n: usize) -> usize {
        let n = self.pool.set_num_threads(n);
        self.bin_store = BinStore::new(n);
        n
    }

    pub fn set_z_clip(&mut self, enabled: bool) {
        self.z_clip = enabled;
    }

    /// Flip every draw's depth comparator polarity (`Less`/`LessEqual` swap with
    /// `Greater`/`GreaterEqual`; `Off` is unaffected) for the reversed-Z convention. Projecting
    /// near/far to `1.0`/`0.0` is the caller's own projection matrix's job, same as the original's
    /// `SR_REVERSED_Z_BUFFER` switch only ever changes the depth test's inequality direction.
    pub fn set_reversed_z(&mut self, enabled: bool) {
        self.reversed_z = enabled;
    }

    pub fn reversed_z(&self) -> bool {
        self.reversed_z
    }

    // -- vertex / index / uniform buffers --------------------------------

    pub fn create_vbo(&mut self, size_bytes: usize) -> Result<Handle<VertexBuffer>> {
        let vbo = VertexBuffer::new(size_bytes)?;
        let h = self.vbos.insert(vbo);
        log::trace!("created vbo {h:?} ({size_bytes} bytes)");
        Ok(h)
    }

    pub fn write_vbo(&mut self, handle: Handle<VertexBuffer>, offset: usize, data: &[u8]) -> Result<()> {
        self.vbos.get_mut(handle).ok_or(Error::InvalidHandle(handle.raw()))?.set_bytes(offset, data)
    }

    pub fn destroy_vbo(&mut self, handle: Handle<VertexBuffer>) -> Result<()> {
        self.vbos.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn get_vbo(&self, handle: Handle<VertexBuffer>) -> Result<&VertexBuffer> {
        self.vbos.get(handle).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn create_ibo(&mut self, count: usize, elem_type: IndexType) -> Result<Handle<IndexBuffer>> {
        let ibo = IndexBuffer::new(count, elem_type)?;
        Ok(self.ibos.insert(ibo))
    }

    pub fn write_ibo(&mut self, handle: Handle<IndexBuffer>, offset: usize, indices: &[u32]) -> Result<()> {
        self.ibos.get_mut(handle).ok_or(Error::InvalidHandle(handle.raw()))?.set_indices(offset, indices)
    }

    pub fn destroy_ibo(&mut self, handle: Handle<IndexBuffer>) -> Result<()> {
        self.ibos.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn get_ibo(&self, handle: Handle<IndexBuffer>) -> Result<&IndexBuffer> {
        self.ibos.get(handle).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn create_ubo(&mut self) -> Handle<UniformBuffer> {
        self.ubos.insert(UniformBuffer::new())
    }

    pub fn write_ubo<T: Copy>(&mut self, handle: Handle<UniformBuffer>, value: T) -> Result<()> {
        self.ubos.get_mut(handle).ok_or(Error::InvalidHandle(handle.raw()))?.set(value);
        Ok(())
    }

    pub fn destroy_ubo(&mut self, handle: Handle<UniformBuffer>) -> Result<()> {
        self.ubos.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    // -- textures ---------------------------------------------------------

    pub fn create_texture(&mut self, format: PixelFormat, width: u32, height: u32, depth: u32) -> Result<Handle<Texture>> {
        let tex = Texture::new(format, width, height, depth)?;
        let h = self.textures.insert(tex);
        log::trace!("created texture {h:?} ({width}x{height}x{depth})");
        Ok(h)
    }

    pub fn create_texture_with_order(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        depth: u32,
        order: TexelOrder,
    ) -> Result<Handle<Texture>> {
        let tex = Texture::with_order(format, width, height, depth, order)?;
        Ok(self.textures.insert(tex))
    }

    pub fn destroy_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        self.textures.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn get_texture(&self, handle: Handle<Texture>) -> Result<&Texture> {
        self.textures.get(handle).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn get_texture_mut(&mut self, handle: Handle<Texture>) -> Result<&mut Texture> {
        self.textures.get_mut(handle).ok_or(Error::InvalidHandle(handle.raw()))
    }

    /// The raw pointer a uniform buffer can embed so a fragment program can sample this texture
    /// without going through `Context`; valid for as long as the texture's slot is not destroyed
    /// (see `handle.rs`'s boxed-slot design note).
    pub fn texture_ptr(&self, handle: Handle<Texture>) -> Result<*const Texture> {
        self.textures.get(handle).map(|t| t as *const Texture).ok_or(Error::InvalidHandle(handle.raw()))
    }

    // -- vertex arrays ------------------------------------------------------

    pub fn create_vao(&mut self, vbo: Handle<VertexBuffer>) -> Result<Handle<VertexArrayDescriptor>> {
        if self.vbos.get(vbo).is_none() {
            return Err(Error::InvalidHandle(vbo.raw()));
        }
        Ok(self.vaos.insert(VertexArrayDescriptor::new(vbo)))
    }

    pub fn set_vao_index_buffer(&mut self, vao: Handle<VertexArrayDescriptor>, ibo: Handle<IndexBuffer>) -> Result<()> {
        if self.ibos.get(ibo).is_none() {
            return Err(Error::InvalidHandle(ibo.raw()));
        }
        self.vaos.get_mut(vao).ok_or(Error::InvalidHandle(vao.raw()))?.set_index_buffer(ibo);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_vao_binding(
        &mut self,
        vao: Handle<VertexArrayDescriptor>,
        slot: usize,
        byte_offset: usize,
        byte_stride: usize,
        dimension: u8,
        scalar_type: ScalarType,
    ) -> Result<()> {
        let vbo_handle = self.vaos.get(vao).ok_or(Error::InvalidHandle(vao.raw()))?.vertex_buffer();
        let vbo = self.vbos.get(vbo_handle).ok_or(Error::InvalidHandle(vbo_handle.raw()))?;
        self.vaos.get_mut(vao).unwrap().set_binding(vbo, slot, byte_offset, byte_stride, dimension, scalar_type)
    }

    pub fn vao_binding(&self, vao: Handle<VertexArrayDescriptor>, slot: usize) -> Result<Option<&AttribBinding>> {
        Ok(self.vaos.get(vao).ok_or(Error::InvalidHandle(vao.raw()))?.binding(slot))
    }

    pub fn destroy_vao(&mut self, handle: Handle<VertexArrayDescriptor>) -> Result<()> {
        self.vaos.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    // -- shaders --------------------------------------------------------------

    /// Register a shader, validating that `num_varyings` and `num_outputs` fit within
    /// `MAX_VARYINGS`/`MAX_OUTPUTS`, and that every shader writes at least one output.
    pub fn create_shader(&mut self, shader: Shader) -> Result<Handle<Shader>> {
        if shader.num_varyings as usize > MAX_VARYINGS {
            return Err(Error::ShaderContractViolation(format!(
                "num_varyings {} exceeds MAX_VARYINGS ({MAX_VARYINGS})",
                shader.num_varyings
            )));
        }
        if shader.num_outputs == 0 || shader.num_outputs as usize > MAX_OUTPUTS {
            return Err(Error::ShaderContractViolation(format!(
                "num_outputs {} must be in 1..={MAX_OUTPUTS}",
                shader.num_outputs
            )));
        }
        if let Some(ubo) = shader.uniforms() {
            if self.ubos.get(ubo).is_none() {
                return Err(Error::InvalidHandle(ubo.raw()));
            }
        }
        Ok(self.shaders.insert(shader))
    }

    pub fn destroy_shader(&mut self, handle: Handle<Shader>) -> Result<()> {
        self.shaders.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn get_shader(&self, handle: Handle<Shader>) -> Result<&Shader> {
        self.shaders.get(handle).ok_or(Error::InvalidHandle(handle.raw()))
    }

    // -- framebuffers -----------------------------------------------------------

    pub fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<Handle<Framebuffer>> {
        Ok(self.framebuffers.insert(Framebuffer::new(width, height)?))
    }

    pub fn attach_color(&mut self, fbo: Handle<Framebuffer>, slot: usize, texture: Handle<Texture>) -> Result<()> {
        let tex = self.textures.get(texture).ok_or(Error::InvalidHandle(texture.raw()))?;
        let fb = self.framebuffers.get(fbo).ok_or(Error::InvalidHandle(fbo.raw()))?;
        if tex.width() != fb.width() || tex.height() != fb.height() {
            return Err(Error::IncompleteFramebuffer(format!(
                "color texture {}x{} does not match framebuffer {}x{}",
                tex.width(),
                tex.height(),
                fb.width(),
                fb.height()
            )));
        }
        self.framebuffers.get_mut(fbo).unwrap().attach_color(slot, texture)
    }

    pub fn attach_depth(&mut self, fbo: Handle<Framebuffer>, texture: Handle<Texture>) -> Result<()> {
        let tex = self.textures.get(texture).ok_or(Error::InvalidHandle(texture.raw()))?;
        if !tex.format().is_scalar_float() {
            return Err(Error::IncompleteFramebuffer("depth attachment must use a scalar float format".into()));
        }
        let fb = self.framebuffers.get(fbo).ok_or(Error::InvalidHandle(fbo.raw()))?;
        if tex.width() != fb.width() || tex.height() != fb.height() {
            return Err(Error::IncompleteFramebuffer(format!(
                "depth texture {}x{} does not match framebuffer {}x{}",
                tex.width(),
                tex.height(),
                fb.width(),
                fb.height()
            )));
        }
        self.framebuffers.get_mut(fbo).unwrap().attach_depth(texture);
        Ok(())
    }

    pub fn destroy_framebuffer(&mut self, handle: Handle<Framebuffer>) -> Result<()> {
        self.framebuffers.remove(handle).map(|_| ()).ok_or(Error::InvalidHandle(handle.raw()))
    }

    pub fn get_framebuffer(&self, handle: Handle<Framebuffer>) -> Result<&Framebuffer> {
        self.framebuffers.get(handle).ok_or(Error::InvalidHandle(handle.raw()))
    }

    // -- clear / blit ----------------------------------------------------------

    pub fn clear_color(&mut self, fbo: Handle<Framebuffer>, slot: usize, color: [f32; 4]) -> Result<()> {
        let tex_handle = self.framebuffers.get(fbo).ok_or(Error::InvalidHandle(fbo.raw()))?.color_attachment(slot);
        let Some(tex_handle) = tex_handle else {
            return Err(Error::InvalidArgument(format!("framebuffer has no color attachment at slot {slot}")));
        };
        self.textures.get_mut(tex_handle).ok_or(Error::InvalidHandle(tex_handle.raw()))?.clear(color);
        Ok(())
    }

    pub fn clear_depth(&mut self, fbo: Handle<Framebuffer>, depth: f32) -> Result<()> {
        let tex_handle = self.framebuffers.get(fbo).ok_or(Error::InvalidHandle(fbo.raw()))?.depth_attachment();
        let Some(tex_handle) = tex_handle else {
            return Err(Error::InvalidArgument("framebuffer has no depth attachment".into()));
        };
        self.textures.get_mut(tex_handle).ok_or(Error::InvalidHandle(tex_handle.raw()))?.clear([depth; 4]);
        Ok(())
    }

    /// Copy `src_rect` of `src`'s color attachment `src_slot` into `dst_rect` of `dst`'s color
    /// attachment `dst_slot`, nearest-neighbor sampling (scaling when the rects differ in size)
    /// and converting pixel format texel-by-texel through the shared `read_rgba_f32`/
    /// `write_rgba_f32` path. `blit(tex, tex, r, r)` for matching rects and an identical format
    /// is the identity.
    pub fn blit(
        &mut self,
        src: Handle<Framebuffer>,
        src_slot: usize,
        src_rect: crate::tile::Rect,
        dst: Handle<Framebuffer>,
        dst_slot: usize,
        dst_rect: crate::tile::Rect,
    ) -> Result<()> {
        let src_tex_h = self
            .framebuffers
            .get(src)
            .ok_or(Error::InvalidHandle(src.raw()))?
            .color_attachment(src_slot)
            .ok_or_else(|| Error::InvalidArgument(format!("source framebuffer has no attachment at slot {src_slot}")))?;
        let dst_tex_h = self
            .framebuffers
            .get(dst)
            .ok_or(Error::InvalidHandle(dst.raw()))?
            .color_attachment(dst_slot)
            .ok_or_else(|| Error::InvalidArgument(format!("destination framebuffer has no attachment at slot {dst_slot}")))?;

        {
            let src_tex = self.textures.get(src_tex_h).ok_or(Error::InvalidHandle(src_tex_h.raw()))?;
            let dst_tex = self.textures.get(dst_tex_h).ok_or(Error::InvalidHandle(dst_tex_h.raw()))?;
            if src_rect.x1 > src_tex.width() || src_rect.y1 > src_tex.height() {
                return Err(Error::InvalidArgument("blit source rect exceeds source texture bounds".into()));
            }
            if dst_rect.x1 > dst_tex.width() || dst_rect.y1 > dst_tex.height() {
                return Err(Error::InvalidArgument("blit destination rect exceeds destination texture bounds".into()));
            }
        }

        let src_w = src_rect.x1.saturating_sub(src_rect.x0);
        let src_h = src_rect.y1.saturating_sub(src_rect.y0);
        let dst_w = dst_rect.x1.saturating_sub(dst_rect.x0);
        let dst_h = dst_rect.y1.saturating_sub(dst_rect.y0);
        if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
            return Ok(());
        }

        // Nearest-neighbor: for each destination texel, sample the source texel whose
        // center falls closest under the rect-to-rect scale factor.
        for dy in 0..dst_h {
            let sy = src_rect.y0 + (dy * src_h) / dst_h;
            for dx in 0..dst_w {
                let sx = src_rect.x0 + (dx * src_w) / dst_w;
                let texel = self.textures.get(src_tex_h).unwrap().read_rgba_f32(sx, sy, 0);
                self.textures.get_mut(dst_tex_h).unwrap().write_rgba_f32(dst_rect.x0 + dx, dst_rect.y0 + dy, 0, texel);
            }
        }
        Ok(())
    }

    // -- draw ------------------------------------------------------------------

    pub fn draw(&mut self, fbo: Handle<Framebuffer>, mesh: &Mesh, shader: Handle<Shader>) -> Result<()> {
        self.draw_instanced(fbo, mesh, shader, 1)
    }

    /// Repeat the vertex -> bin -> fragment pipeline `n_instances` times, varying `instance_id`
    /// (`draw_instanced`). Each instance fully drains before the next begins.
    pub fn draw_instanced(&mut self, fbo: Handle<Framebuffer>, mesh: &Mesh, shader_handle: Handle<Shader>, n_instances: usize) -> Result<()> {
        let shader = self.shaders.get(shader_handle).ok_or(Error::InvalidHandle(shader_handle.raw()))?;
        let vao = self.vaos.get(mesh.vertex_array()).ok_or(Error::InvalidHandle(mesh.vertex_array().raw()))?;
        let vbo = self.vbos.get(vao.vertex_buffer()).ok_or(Error::InvalidHandle(vao.vertex_buffer().raw()))?;
        let ibo = match vao.index_buffer() {
            Some(h) => Some(self.ibos.get(h).ok_or(Error::InvalidHandle(h.raw()))?),
            None => None,
        };
        if mesh.mode.is_indexed() != ibo.is_some() {
            return Err(Error::InvalidArgument("mesh primitive mode's indexing does not match its vertex array's index buffer".into()));
        }
        let empty_ubo = UniformBuffer::new();
        let uniforms = match shader.uniforms() {
            Some(h) => self.ubos.get(h).ok_or(Error::InvalidHandle(h.raw()))?,
            None => &empty_ubo,
        };

        let fb = self.framebuffers.get(fbo).ok_or(Error::InvalidHandle(fbo.raw()))?;
        if !fb.is_complete() {
            return Err(Error::IncompleteFramebuffer("framebuffer has no attachments".into()));
        }
        let num_color = fb.num_color_attachments();
        if (shader.num_outputs as usize) > num_color {
            return Err(Error::AttachmentMismatch {
                shader_outputs: shader.num_outputs as usize,
                color_attachments: num_color,
            });
        }
        let (fb_width, fb_height) = (fb.width(), fb.height());
        let color_handles: Vec<Option<Handle<Texture>>> = (0..crate::framebuffer::MAX_COLOR_ATTACHMENTS).map(|i| fb.color_attachment(i)).collect();
        let depth_handle = fb.depth_attachment();

        for instance_id in 0..n_instances {
            let mut color_refs: [Option<&mut Texture>; crate::framebuffer::MAX_COLOR_ATTACHMENTS] = core::array::from_fn(|_| None);
            // Borrow each attached texture mutably; attachments are distinct handles (a shader
            // writing the same texture to two slots is a caller error this crate doesn't detect).
            let textures_ptr = &mut self.textures as *mut Pool<Texture>;
            for (i, h) in color_handles.iter().enumerate() {
                if let Some(h) = h {
                    // Safety: each handle in `color_handles` is distinct, so these borrows never alias.
                    color_refs[i] = Some(unsafe { (*textures_ptr).get_mut(*h).ok_or(Error::InvalidHandle(h.raw()))? });
                }
            }
            let depth_ref = match depth_handle {
                Some(h) => Some(unsafe { (*textures_ptr).get_mut(h).ok_or(Error::InvalidHandle(h.raw()))? }),
                None => None,
            };

            let mut targets = RenderTargets { color: color_refs, depth: depth_ref };
            let params = DrawParams {
                uniforms,
                vao,
                vbo,
                ibo,
                shader,
                mesh,
                instance_id,
                fb_width,
                fb_height,
                z_clip: self.z_clip,
                reversed_z: self.reversed_z,
            };
            log::trace!("draw: instance {instance_id}/{n_instances}, {} threads", self.pool.num_threads());
            self.pool.draw(&params, &mut self.bin_store, &mut targets);
        }
        Ok(())
    }
}

