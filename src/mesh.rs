//! Draw descriptors: a vertex-array handle, a primitive topology, and an element range.
//!
//! Grounded on euc's `PrimitiveKind` trait (`src/primitive/mod.rs`), generalized from a
//! compile-time type parameter on `Pipeline` to a runtime enum, since a `Mesh` here is a plain
//! resource rather than something monomorphized per draw call.

use crate::handle::Handle;
use crate::vertex_array::VertexArrayDescriptor;

/// Mirrors `SR_RenderMode` from the C++ original: point, line, and triangle
/// topologies, each with an indexed variant, plus a wireframe triangle mode that walks triangle
/// edges instead of filling them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points,
    Lines,
    Triangles,
    TriangleWireframe,
    IndexedPoints,
    IndexedLines,
    IndexedTriangles,
    IndexedTriangleWireframe,
}

impl PrimitiveMode {
    pub fn is_indexed(self) -> bool {
        matches!(
            self,
            PrimitiveMode::IndexedPoints
                | PrimitiveMode::IndexedLines
                | PrimitiveMode::IndexedTriangles
                | PrimitiveMode::IndexedTriangleWireframe
        )
    }

    /// Number of vertices consumed per primitive instance (before any index indirection).
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            PrimitiveMode::Points | PrimitiveMode::IndexedPoints => 1,
            PrimitiveMode::Lines | PrimitiveMode::IndexedLines => 2,
            PrimitiveMode::Triangles
            | PrimitiveMode::TriangleWireframe
            | PrimitiveMode::IndexedTriangles
            | PrimitiveMode::IndexedTriangleWireframe => 3,
        }
    }

    pub fn is_wireframe(self) -> bool {
        matches!(self, PrimitiveMode::TriangleWireframe | PrimitiveMode::IndexedTriangleWireframe)
    }
}

/// A drawable unit: which vertex array to read, which primitives to assemble, which contiguous
/// range of elements (vertices, or indices when indexed) to draw, and an opaque material id a
/// vertex/fragment program may branch on via its uniform buffer.
pub struct Mesh {
    pub(crate) vao: Handle<VertexArrayDescriptor>,
    pub mode: PrimitiveMode,
    pub first: usize,
    pub count: usize,
    pub material: u32,
}

impl Mesh {
    pub fn new(vao: Handle<VertexArrayDescriptor>, mode: PrimitiveMode, first: usize, count: usize) -> Self {
        Self {
            vao,
            mode,
            first,
            count,
            material: 0,
        }
    }

    pub fn vertex_array(&self) -> Handle<VertexArrayDescriptor> {
        self.vao
    }

    pub fn with_material(mut self, material: u32) -> Self {
        self.material = material;
        self
    }
}
