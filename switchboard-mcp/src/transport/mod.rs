//! Transport layer: line-framed JSON-RPC over child-process stdio

pub mod codec;
pub mod stdio;

pub use codec::LineCodec;
pub use stdio::{ChildClient, ChildSpec};
