//! wlgrab platform core contracts.
//!
//! This crate contains the display/capture data structures shared by the
//! capture and render crates without coupling to a concrete transport:
//! logical layout boxes, output transforms, and the wl_shm pixel format
//! adapter.

pub mod geometry;
pub mod pixel_format;
pub mod transform;

pub use geometry::*;
pub use pixel_format::*;
pub use transform::*;

use serde::{Deserialize, Serialize};

/// What kind of entity a capture source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A monitor output.
    Output,
    /// A foreign toplevel (application window).
    Toplevel,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Output => f.write_str("output"),
            SourceKind::Toplevel => f.write_str("toplevel"),
        }
    }
}
