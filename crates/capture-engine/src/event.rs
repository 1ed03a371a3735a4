//! Capture events delivered by the transport.

use wlgrab_platform_core::{OutputTransform, ShmFormat};

use crate::backend::SessionId;

/// Events of the legacy single-shot protocol (wlr-screencopy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreencopyEvent {
    /// Parameters of the buffer the client must provide.
    Buffer {
        format: ShmFormat,
        width: u32,
        height: u32,
        stride: u32,
    },
    Flags { y_invert: bool },
    Damage {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// The copy finished.
    Ready,
    Failed,
}

/// Session-level events of the session/frame protocol
/// (ext-image-copy-capture).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCopySessionEvent {
    BufferSize { width: u32, height: u32 },
    ShmFormat(ShmFormat),
    DmabufDevice,
    DmabufFormat { format: u32 },
    /// All buffer constraints have been sent.
    Done,
    Stopped,
}

/// Why a session/frame capture failed. Carried for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Unknown,
    BufferConstraints,
    Stopped,
}

impl FailureReason {
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => Self::BufferConstraints,
            2 => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// Frame-level events of the session/frame protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCopyFrameEvent {
    Transform(OutputTransform),
    Damage {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    PresentationTime { sec: u64, nsec: u32 },
    Ready,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Screencopy(ScreencopyEvent),
    Session(ImageCopySessionEvent),
    Frame(ImageCopyFrameEvent),
}

/// An event addressed to one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub session: SessionId,
    pub event: CaptureEvent,
}

impl TransportEvent {
    pub fn new(session: SessionId, event: CaptureEvent) -> Self {
        Self { session, event }
    }
}

impl From<ScreencopyEvent> for CaptureEvent {
    fn from(event: ScreencopyEvent) -> Self {
        Self::Screencopy(event)
    }
}

impl From<ImageCopySessionEvent> for CaptureEvent {
    fn from(event: ImageCopySessionEvent) -> Self {
        Self::Session(event)
    }
}

impl From<ImageCopyFrameEvent> for CaptureEvent {
    fn from(event: ImageCopyFrameEvent) -> Self {
        Self::Frame(event)
    }
}
