//! A CPU-only, multi-threaded software rasterizer core: vertex processing, homogeneous
//! clipping, tile-oriented binning, scanline rasterization with perspective-correct
//! interpolation, depth testing, and blending, tied together by a small worker pool.
//!
//! [`Context`] is the crate's sole entry point: it owns every resource (buffers, textures,
//! vertex arrays, shaders, framebuffers) behind stable [`handle::Handle`]s and exposes `draw`/
//! `draw_instanced` as the only synchronization boundary a caller needs to reason about — a
//! call to either blocks until every worker thread has retired its share of the framebuffer.

mod bin;
mod buffer;
mod clip;
mod context;
mod error;
mod framebuffer;
mod handle;
mod math;
mod mesh;
mod pool;
mod shader;
mod stage;
mod texture;
mod tile;
mod vertex_array;

pub use buffer::{IndexBuffer, IndexType, UniformBuffer, VertexBuffer};
pub use context::Context;
pub use error::{Error, Result};
pub use framebuffer::{Framebuffer, MAX_COLOR_ATTACHMENTS};
pub use handle::{Handle, RawHandle};
pub use mesh::{Mesh, PrimitiveMode};
pub use shader::{
    BlendMode, CullMode, DepthCompare, FragCoord, FragmentParam, FragmentProgram, Shader, VertexParam, VertexProgram, MAX_OUTPUTS, MAX_VARYINGS,
};
pub use texture::{Channels, ChannelType, CubeFace, Filter, PixelFormat, Texture, TexelOrder, WrapMode};
pub use vertex_array::{AttribBinding, ScalarType, VertexArrayDescriptor, MAX_ATTRIBUTES};

pub use tile::{scanline_offset, subregion, tile_split, Rect};
pub use math::Vec4;
