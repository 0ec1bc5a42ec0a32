// Tioga Compositor
//
// A Wayland compositor speaking the wire protocol over a hand-rolled
// raw-socket layer. All shared logic lives in core/; the GPU, WSI,
// backend and keymap-compiler collaborators sit behind traits.

pub mod core;
pub mod util;
pub mod version;

pub use crate::core::{run, Server, ServerConfig};
