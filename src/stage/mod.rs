//! The two pipeline stages a draw call walks through, after vertex/index fetch and before
//! framebuffer commit.

pub mod fragment;
pub mod vertex;
