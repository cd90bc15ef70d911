//! Framebuffers: up to four color attachments plus one depth attachment, generalized from
//! euc's `Target` trait (`src/target.rs`) — which let a draw call write directly into a
//! caller-owned `Buffer` — into a handle-addressed resource so a `Context` can hold many
//! framebuffers and a shader can write to more than one color output at once.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::texture::Texture;

pub const MAX_COLOR_ATTACHMENTS: usize = 4;

pub struct Framebuffer {
    width: u32,
    height: u32,
    pub(crate) color: [Option<Handle<Texture>>; MAX_COLOR_ATTACHMENTS],
    pub(crate) depth: Option<Handle<Texture>>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument("framebuffer dimensions must be nonzero".into()));
        }
        Ok(Self {
            width,
            height,
            color: [None; MAX_COLOR_ATTACHMENTS],
            depth: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Attach `texture` as color output `slot`. The caller must verify the texture's dimensions
    /// against `width()`/`height()` before calling, since this struct doesn't itself hold the
    /// texture store to check against.
    pub fn attach_color(&mut self, slot: usize, texture: Handle<Texture>) -> Result<()> {
        if slot >= MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidArgument(format!(
                "color attachment slot {slot} exceeds MAX_COLOR_ATTACHMENTS ({MAX_COLOR_ATTACHMENTS})"
            )));
        }
        self.color[slot] = Some(texture);
        Ok(())
    }

    pub fn attach_depth(&mut self, texture: Handle<Texture>) {
        self.depth = Some(texture);
    }

    pub fn color_attachment(&self, slot: usize) -> Option<Handle<Texture>> {
        self.color.get(slot).copied().flatten()
    }

    pub fn depth_attachment(&self) -> Option<Handle<Texture>> {
        self.depth
    }

    /// Number of color attachments currently bound, counting from slot 0 up to the first gap.
    /// A shader writing `num_outputs` values is only valid against a framebuffer whose leading
    /// `num_outputs` slots are all occupied; see [`crate::error::Error::AttachmentMismatch`].
    pub fn num_color_attachments(&self) -> usize {
        self.color.iter().take_while(|slot| slot.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.color.iter().any(Option::is_some) || self.depth.is_some()
    }
}
