use crate::handle::RawHandle;

/// Every fallible operation on a [`crate::Context`] reports failure through this type; nothing
/// in the crate panics or unwinds across a public API boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A handle referred to a resource that was never created, or has since been destroyed.
    #[error("invalid handle: {0:?}")]
    InvalidHandle(RawHandle),

    /// An argument violated a precondition (zero size, unknown format, out-of-range dimension…).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The allocator could not satisfy a resource creation request.
    #[error("out of memory while allocating {0}")]
    OutOfMemory(String),

    /// A shader's varying/output counts violated the vertex/fragment contract.
    #[error("shader contract violation: {0}")]
    ShaderContractViolation(String),

    /// A framebuffer's attachments disagree on dimensions, or it has no depth attachment.
    #[error("incomplete framebuffer: {0}")]
    IncompleteFramebuffer(String),

    /// A shader's output count exceeds the framebuffer's color attachment count.
    #[error("attachment mismatch: shader writes {shader_outputs} outputs, framebuffer has {color_attachments} color attachments")]
    AttachmentMismatch {
        shader_outputs: usize,
        color_attachments: usize,
    },
}

pub type Result<T> = core::result::Result<T, Error>;
