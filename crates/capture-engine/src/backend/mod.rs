use serde::{Deserialize, Serialize};

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::ShmFormat;
use wlgrab_platform_linux::{OutputEvent, OutputId, ToplevelEvent, ToplevelId};

use crate::event::TransportEvent;

pub mod synthetic;

pub use synthetic::{SyntheticCompositor, SyntheticOutput, SyntheticToplevel};

/// Identifies one capture session towards the transport. Every event the
/// transport delivers for that capture carries the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

/// What a capture session is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    Output(OutputId),
    Toplevel(ToplevelId),
}

/// Globals advertised by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportCapabilities {
    /// Shared-memory buffers (`wl_shm`).
    pub shm: bool,
    /// Legacy single-shot output capture (wlr-screencopy).
    pub screencopy: bool,
    /// Session/frame capture manager (ext-image-copy-capture).
    pub image_copy: bool,
    /// Output image capture sources.
    pub output_source: bool,
    /// Foreign toplevel image capture sources.
    pub toplevel_source: bool,
    /// Foreign toplevel enumeration.
    pub toplevel_list: bool,
}

impl TransportCapabilities {
    /// Everything a modern compositor offers.
    pub fn all() -> Self {
        Self {
            shm: true,
            screencopy: true,
            image_copy: true,
            output_source: true,
            toplevel_source: true,
            toplevel_list: true,
        }
    }

    /// Outputs can be captured through the session/frame variant.
    pub fn can_image_copy_outputs(&self) -> bool {
        self.image_copy && self.output_source
    }

    /// Toplevels can be captured at all.
    pub fn can_capture_toplevels(&self) -> bool {
        self.image_copy && self.toplevel_source
    }

    /// Outputs can be captured with at least one protocol variant.
    pub fn can_capture_outputs(&self) -> bool {
        self.screencopy || self.can_image_copy_outputs()
    }
}

/// A shared-memory pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmBuffer {
    pub format: ShmFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row; may exceed `width * bpp`.
    pub stride: u32,
    pub data: Vec<u8>,
}

impl ShmBuffer {
    /// Zero-filled buffer of `stride * height` bytes.
    pub fn zeroed(format: ShmFormat, width: u32, height: u32, stride: u32) -> WlgrabResult<Self> {
        let size = (stride as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| {
                WlgrabError::allocation(format!(
                    "buffer {width}x{height} with stride {stride} overflows"
                ))
            })?;
        Ok(Self {
            format,
            width,
            height,
            stride,
            data: vec![0; size],
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Everything enumeration has learned since the previous roundtrip.
#[derive(Debug, Clone, Default)]
pub struct EnumerationBatch {
    pub outputs: Vec<(OutputId, OutputEvent)>,
    pub toplevels: Vec<(ToplevelId, ToplevelEvent)>,
}

/// Discovers outputs and toplevels.
pub trait SourceEnumerator {
    /// Whether precise logical geometry will be reported for outputs.
    fn has_precise_layout(&self) -> bool;

    /// Block until the compositor has answered every pending request and
    /// return the metadata events received meanwhile.
    fn roundtrip(&mut self) -> WlgrabResult<EnumerationBatch>;
}

/// Drives captures on the compositor.
///
/// Requests only enqueue work; results arrive later through [`dispatch`].
///
/// [`dispatch`]: CaptureTransport::dispatch
pub trait CaptureTransport {
    fn capabilities(&self) -> TransportCapabilities;

    /// Start a single-shot output capture. The transport answers with
    /// buffer parameters.
    fn capture_output_screencopy(
        &mut self,
        session: SessionId,
        output: OutputId,
        with_cursor: bool,
    ) -> WlgrabResult<()>;

    /// Open a capture session on an output or toplevel. The transport
    /// answers with buffer constraints followed by a settle event.
    fn create_image_copy_session(
        &mut self,
        session: SessionId,
        target: CaptureTarget,
        with_cursor: bool,
    ) -> WlgrabResult<()>;

    /// Ask for the pending single-shot frame to be copied into `buffer`.
    fn copy_screencopy_frame(&mut self, session: SessionId, buffer: &mut ShmBuffer)
        -> WlgrabResult<()>;

    /// Create a frame on the session, attach `buffer`, damage it fully and
    /// request the capture.
    fn capture_image_copy_frame(
        &mut self,
        session: SessionId,
        buffer: &mut ShmBuffer,
    ) -> WlgrabResult<()>;

    /// Block until at least one event is available and return every
    /// queued event. An error means the connection is unusable.
    fn dispatch(&mut self) -> WlgrabResult<Vec<TransportEvent>>;
}

/// Provides memory for capture buffers.
pub trait BufferAllocator {
    fn allocate(
        &mut self,
        format: ShmFormat,
        width: u32,
        height: u32,
        stride: u32,
    ) -> WlgrabResult<ShmBuffer>;
}

/// Process-local heap allocator with an optional total size cap.
#[derive(Debug, Clone, Default)]
pub struct HeapAllocator {
    limit: Option<usize>,
    allocated: usize,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse allocations once `bytes` have been handed out in total.
    pub fn with_limit(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            allocated: 0,
        }
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(
        &mut self,
        format: ShmFormat,
        width: u32,
        height: u32,
        stride: u32,
    ) -> WlgrabResult<ShmBuffer> {
        if width == 0 || height == 0 {
            return Err(WlgrabError::allocation(format!(
                "refusing empty {width}x{height} buffer"
            )));
        }
        let size = (stride as usize).saturating_mul(height as usize);
        if let Some(limit) = self.limit {
            if self.allocated.saturating_add(size) > limit {
                return Err(WlgrabError::allocation(format!(
                    "{size} bytes requested, {} of {limit} already in use",
                    self.allocated
                )));
            }
        }
        let buffer = ShmBuffer::zeroed(format, width, height, stride)?;
        self.allocated += buffer.size();
        tracing::debug!(%format, width, height, stride, "Allocated shm buffer");
        Ok(buffer)
    }
}
