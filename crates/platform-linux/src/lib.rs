//! wlgrab Linux/Wayland platform layer
//!
//! Everything that depends on how a Wayland desktop describes itself:
//! - **Display layout:** output metadata accumulation and logical geometry
//!   resolution (precise or guessed)
//! - **Toplevels:** foreign toplevel tracking for window captures
//! - **Paths:** default file names and the XDG pictures directory

pub mod display;
pub mod paths;
pub mod toplevel;

pub use display::*;
pub use toplevel::*;
