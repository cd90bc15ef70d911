//! Vertex-array descriptors: the binding of attribute layouts to a single vertex buffer.

use crate::buffer::IndexBuffer;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::buffer::VertexBuffer;

/// The maximum number of attribute bindings a [`VertexArrayDescriptor`] may declare.
pub const MAX_ATTRIBUTES: usize = 8;

/// The scalar type underlying one component of a vertex attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    F32,
    U8,
    U16,
    U32,
}

impl ScalarType {
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::F32 | ScalarType::U32 => 4,
            ScalarType::U16 => 2,
            ScalarType::U8 => 1,
        }
    }
}

/// `(byte_offset, byte_stride, dimension, scalar_type)` for one vertex attribute.
#[derive(Copy, Clone, Debug)]
pub struct AttribBinding {
    pub byte_offset: usize,
    pub byte_stride: usize,
    pub dimension: u8,
    pub scalar_type: ScalarType,
}

/// Binds one vertex buffer and optionally one index buffer, plus up to [`MAX_ATTRIBUTES`]
/// attribute bindings. All bindings share the same vertex buffer.
pub struct VertexArrayDescriptor {
    pub(crate) vbo: Handle<VertexBuffer>,
    pub(crate) ibo: Option<Handle<IndexBuffer>>,
    attributes: [Option<AttribBinding>; MAX_ATTRIBUTES],
}

impl VertexArrayDescriptor {
    pub fn new(vbo: Handle<VertexBuffer>) -> Self {
        Self {
            vbo,
            ibo: None,
            attributes: [None; MAX_ATTRIBUTES],
        }
    }

    pub fn set_index_buffer(&mut self, ibo: Handle<IndexBuffer>) {
        self.ibo = Some(ibo);
    }

    pub fn index_buffer(&self) -> Option<Handle<IndexBuffer>> {
        self.ibo
    }

    pub fn vertex_buffer(&self) -> Handle<VertexBuffer> {
        self.vbo
    }

    /// Bind attribute slot `i`, validating that it stays within `vbo`'s bounds for at least one
    /// vertex. Full-buffer bounds (`offset + stride * vertex_count`) are re-checked per draw,
    /// since the vertex count isn't known until the mesh's element range is given.
    pub fn set_binding(
        &mut self,
        vbo: &VertexBuffer,
        i: usize,
        byte_offset: usize,
        byte_stride: usize,
        dimension: u8,
        scalar_type: ScalarType,
    ) -> Result<()> {
        if i >= MAX_ATTRIBUTES {
            return Err(Error::InvalidArgument(format!(
                "attribute slot {i} exceeds MAX_ATTRIBUTES ({MAX_ATTRIBUTES})"
            )));
        }
        if dimension == 0 || dimension > 4 {
            return Err(Error::InvalidArgument(format!(
                "attribute dimension {dimension} must be in 1..=4"
            )));
        }
        let min_span = byte_offset + dimension as usize * scalar_type.byte_size();
        if min_span > vbo.len() {
            return Err(Error::InvalidArgument(format!(
                "attribute {i} at offset {byte_offset} does not fit within a {}-byte vertex buffer",
                vbo.len()
            )));
        }
        self.attributes[i] = Some(AttribBinding {
            byte_offset,
            byte_stride,
            dimension,
            scalar_type,
        });
        Ok(())
    }

    pub fn binding(&self, i: usize) -> Option<&AttribBinding> {
        self.attributes.get(i).and_then(|b| b.as_ref())
    }

    /// Fetch attribute `i` for vertex `vert_id` as a 4-component float vector, zero-padding any
    /// missing components. Integer scalar types are normalized to `[0, 1]` the way a texel
    /// fetch would be, matching the convention vertex programs expect for color attributes.
    pub fn fetch_attrib(&self, vbo: &VertexBuffer, i: usize, vert_id: usize) -> [f32; 4] {
        let Some(binding) = self.binding(i) else {
            return [0.0; 4];
        };
        let base = binding.byte_offset + binding.byte_stride * vert_id;
        let mut out = [0.0f32; 4];
        for c in 0..binding.dimension as usize {
            let at = base + c * binding.scalar_type.byte_size();
            out[c] = match binding.scalar_type {
                ScalarType::F32 => vbo.read_f32(at),
                ScalarType::U8 => vbo.as_bytes()[at] as f32 / u8::MAX as f32,
                ScalarType::U16 => {
                    let b = vbo.as_bytes();
                    u16::from_le_bytes([b[at], b[at + 1]]) as f32 / u16::MAX as f32
                }
                ScalarType::U32 => {
                    let b = vbo.as_bytes();
                    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]) as f32
                }
            };
        }
        out
    }
}
