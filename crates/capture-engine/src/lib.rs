//! wlgrab Capture Engine
//!
//! Drives captures of one or more display sources through the compositor's
//! capture protocols and hands the filled buffers to the render engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 CaptureRegistry                  │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────┐  │
//! │  │ Session DP-1 │ │ Session DP-2 │ │   ...    │  │
//! │  │ (screencopy) │ │ (image copy) │ │          │  │
//! │  └──────┬───────┘ └──────┬───────┘ └────┬─────┘  │
//! │         │ events         │ events       │        │
//! │         ▼                ▼              ▼        │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │   CaptureTransport / BufferAllocator       │  │
//! │  └────────────────────────────────────────────┘  │
//! └──────────────────────────┬───────────────────────┘
//!                            ▼
//!                 wlgrab-render-engine::render
//! ```

pub mod backend;
pub mod event;
pub mod pipeline;
pub mod registry;
pub mod session;

pub use backend::{
    BufferAllocator, CaptureTarget, CaptureTransport, HeapAllocator, SessionId, ShmBuffer,
    SourceEnumerator, TransportCapabilities,
};
pub use pipeline::{take_screenshot, Screenshot, ScreenshotRequest};
pub use registry::CaptureRegistry;
pub use session::{CaptureSession, ProtocolVariant, SessionState};
