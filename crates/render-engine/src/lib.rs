//! wlgrab Render Engine
//!
//! Turns a set of finished captures into one image file.
//!
//! # Pipeline Architecture
//!
//! ```text
//! output A (shm, 90°) ──┐
//!                       ├── Decode to premultiplied ARGB
//! output B (shm, 1x) ───┘         │
//!                                 ├── Affine map onto the logical region
//!                                 │     (bilinear / Lanczos-2, Replace / Over)
//!                                 ▼
//!                              Canvas
//!                                 │
//!                                 ▼
//!                     Encode (PNG / PPM / JPEG)
//! ```

pub mod compositor;
pub mod export;
pub mod raster;
pub mod transform;

pub use compositor::{render, CompositeSource};
pub use export::*;
pub use raster::{BufferView, Canvas};
