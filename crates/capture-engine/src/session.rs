//! Per-source capture state machine.
//!
//! A [`CaptureSession`] drives one source from the capture request to a
//! filled buffer. Two protocol variants are supported:
//!
//! - **Screencopy** (single-shot): the compositor announces buffer
//!   parameters, the client allocates and requests the copy, the compositor
//!   signals ready or failed.
//! - **Image copy** (session/frame): the compositor announces a buffer size
//!   and the shm formats it can fill, then settles with `done`; the client
//!   allocates, creates a frame and requests the capture.
//!
//! ```text
//! Pending ──buffer params──────────────────────────────► Copying ──ready──► Done
//!    │                                                     ▲   └──failed──► Failed
//!    └──size + format──► BufferNegotiated ──done──────────┘
//! ```

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::{LogicalBox, OutputTransform, ShmFormat, SourceKind};
use wlgrab_platform_linux::{ResolvedOutput, ToplevelInfo};
use wlgrab_render_engine::{BufferView, CompositeSource};

use crate::backend::{BufferAllocator, CaptureTarget, CaptureTransport, SessionId, ShmBuffer};
use crate::event::{CaptureEvent, ImageCopyFrameEvent, ImageCopySessionEvent, ScreencopyEvent};

/// Which capture protocol a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    Screencopy,
    ImageCopy,
}

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Capture requested, nothing negotiated yet.
    Pending,
    /// Size and a supported format are known (image copy only).
    BufferNegotiated,
    /// A buffer is attached and the copy is in flight.
    Copying,
    Done,
    Failed,
}

/// Result of feeding one event to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProgress {
    InFlight,
    /// The session just reached [`SessionState::Done`].
    Completed,
}

/// One in-flight capture.
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    target: CaptureTarget,
    name: String,
    variant: ProtocolVariant,
    state: SessionState,
    logical: LogicalBox,
    transform: OutputTransform,
    buffer_size: Option<(u32, u32)>,
    format: Option<ShmFormat>,
    buffer: Option<ShmBuffer>,
    y_invert: bool,
    frame_requested: bool,
}

impl CaptureSession {
    /// Session for an output whose geometry is already resolved.
    pub fn for_output(id: SessionId, output: &ResolvedOutput, variant: ProtocolVariant) -> Self {
        Self {
            id,
            target: CaptureTarget::Output(output.id),
            name: output.display_name(),
            variant,
            state: SessionState::Pending,
            logical: output.geometry.logical,
            transform: output.geometry.transform,
            buffer_size: None,
            format: None,
            buffer: None,
            y_invert: false,
            frame_requested: false,
        }
    }

    /// Session for a toplevel. Its geometry is only learned from the
    /// announced buffer size.
    pub fn for_toplevel(id: SessionId, toplevel: &ToplevelInfo) -> Self {
        let name = toplevel
            .identifier
            .clone()
            .unwrap_or_else(|| format!("toplevel #{}", toplevel.id.0));
        Self {
            id,
            target: CaptureTarget::Toplevel(toplevel.id),
            name,
            variant: ProtocolVariant::ImageCopy,
            state: SessionState::Pending,
            logical: LogicalBox::default(),
            transform: OutputTransform::Normal,
            buffer_size: None,
            format: None,
            buffer: None,
            y_invert: false,
            frame_requested: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    pub fn kind(&self) -> SourceKind {
        match self.target {
            CaptureTarget::Output(_) => SourceKind::Output,
            CaptureTarget::Toplevel(_) => SourceKind::Toplevel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn logical(&self) -> LogicalBox {
        self.logical
    }

    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    pub fn format(&self) -> Option<ShmFormat> {
        self.format
    }

    pub fn buffer(&self) -> Option<&ShmBuffer> {
        self.buffer.as_ref()
    }

    pub fn y_invert(&self) -> bool {
        self.y_invert
    }

    /// Issue the initial capture request.
    pub fn start(
        &mut self,
        transport: &mut dyn CaptureTransport,
        with_cursor: bool,
    ) -> WlgrabResult<()> {
        tracing::debug!(
            session = self.id.0,
            source = %self.name,
            variant = ?self.variant,
            with_cursor,
            "Requesting capture"
        );
        match (self.variant, self.target) {
            (ProtocolVariant::Screencopy, CaptureTarget::Output(output)) => {
                transport.capture_output_screencopy(self.id, output, with_cursor)
            }
            (ProtocolVariant::Screencopy, CaptureTarget::Toplevel(_)) => Err(
                WlgrabError::unsupported("toplevels can only be captured with image copy"),
            ),
            (ProtocolVariant::ImageCopy, target) => {
                transport.create_image_copy_session(self.id, target, with_cursor)
            }
        }
    }

    /// Fold one transport event into the session.
    ///
    /// Errors are fatal for the whole screenshot; the session is left in
    /// [`SessionState::Failed`].
    pub fn handle_event(
        &mut self,
        event: CaptureEvent,
        transport: &mut dyn CaptureTransport,
        allocator: &mut dyn BufferAllocator,
    ) -> WlgrabResult<SessionProgress> {
        let result = match (self.variant, event) {
            (ProtocolVariant::Screencopy, CaptureEvent::Screencopy(event)) => {
                self.handle_screencopy(event, transport, allocator)
            }
            (ProtocolVariant::ImageCopy, CaptureEvent::Session(event)) => {
                self.handle_session(event, transport, allocator)
            }
            (ProtocolVariant::ImageCopy, CaptureEvent::Frame(event)) => self.handle_frame(event),
            (variant, event) => Err(WlgrabError::transport(format!(
                "{variant:?} session for {} received {event:?}",
                self.name
            ))),
        };
        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    fn handle_screencopy(
        &mut self,
        event: ScreencopyEvent,
        transport: &mut dyn CaptureTransport,
        allocator: &mut dyn BufferAllocator,
    ) -> WlgrabResult<SessionProgress> {
        match event {
            ScreencopyEvent::Buffer {
                format,
                width,
                height,
                stride,
            } => {
                if self.state != SessionState::Pending {
                    tracing::debug!(source = %self.name, %format, "Ignoring extra buffer announcement");
                    return Ok(SessionProgress::InFlight);
                }
                if !format.is_supported() {
                    return Err(WlgrabError::unsupported_format(
                        &self.name,
                        format!("{format} cannot be composited"),
                    ));
                }
                self.buffer_size = Some((width, height));
                self.format = Some(format);
                let mut buffer = allocator.allocate(format, width, height, stride)?;
                transport.copy_screencopy_frame(self.id, &mut buffer)?;
                self.buffer = Some(buffer);
                self.state = SessionState::Copying;
                Ok(SessionProgress::InFlight)
            }
            ScreencopyEvent::Flags { y_invert } => {
                self.y_invert = y_invert;
                Ok(SessionProgress::InFlight)
            }
            ScreencopyEvent::Damage { .. } => Ok(SessionProgress::InFlight),
            ScreencopyEvent::Ready => self.complete(),
            ScreencopyEvent::Failed => Err(WlgrabError::capture_failed(
                &self.name,
                "compositor reported failure",
            )),
        }
    }

    fn handle_session(
        &mut self,
        event: ImageCopySessionEvent,
        transport: &mut dyn CaptureTransport,
        allocator: &mut dyn BufferAllocator,
    ) -> WlgrabResult<SessionProgress> {
        match event {
            ImageCopySessionEvent::BufferSize { width, height } => {
                self.buffer_size = Some((width, height));
                if self.kind() == SourceKind::Toplevel {
                    self.logical = LogicalBox::new(0, 0, width as i32, height as i32);
                }
                self.mark_negotiated();
            }
            ImageCopySessionEvent::ShmFormat(format) => {
                if self.format.is_none() && format.is_supported() {
                    self.format = Some(format);
                    self.mark_negotiated();
                } else {
                    tracing::trace!(source = %self.name, %format, "Skipping shm format");
                }
            }
            ImageCopySessionEvent::Done => {
                if self.frame_requested {
                    tracing::debug!(source = %self.name, "Constraints re-sent while a frame is outstanding");
                    return Ok(SessionProgress::InFlight);
                }
                let format = self.format.ok_or_else(|| {
                    WlgrabError::unsupported_format(&self.name, "no supported format found")
                })?;
                let (width, height) = self.buffer_size.ok_or_else(|| {
                    WlgrabError::transport(format!("{} settled without a buffer size", self.name))
                })?;
                let stride = format.minimum_stride(width).ok_or_else(|| {
                    WlgrabError::allocation(format!("row of {width} pixels overflows a stride"))
                })?;
                let mut buffer = allocator.allocate(format, width, height, stride)?;
                transport.capture_image_copy_frame(self.id, &mut buffer)?;
                self.buffer = Some(buffer);
                self.frame_requested = true;
                self.state = SessionState::Copying;
            }
            ImageCopySessionEvent::DmabufDevice
            | ImageCopySessionEvent::DmabufFormat { .. }
            | ImageCopySessionEvent::Stopped => {}
        }
        Ok(SessionProgress::InFlight)
    }

    fn handle_frame(&mut self, event: ImageCopyFrameEvent) -> WlgrabResult<SessionProgress> {
        match event {
            ImageCopyFrameEvent::Transform(transform) => {
                self.transform = transform;
                Ok(SessionProgress::InFlight)
            }
            ImageCopyFrameEvent::Damage { .. } | ImageCopyFrameEvent::PresentationTime { .. } => {
                Ok(SessionProgress::InFlight)
            }
            ImageCopyFrameEvent::Ready => self.complete(),
            ImageCopyFrameEvent::Failed(reason) => Err(WlgrabError::capture_failed(
                &self.name,
                format!("compositor reported failure ({reason:?})"),
            )),
        }
    }

    fn mark_negotiated(&mut self) {
        if self.state == SessionState::Pending && self.buffer_size.is_some() && self.format.is_some()
        {
            self.state = SessionState::BufferNegotiated;
        }
    }

    fn complete(&mut self) -> WlgrabResult<SessionProgress> {
        if self.state != SessionState::Copying {
            return Err(WlgrabError::transport(format!(
                "{} reported ready while {:?}",
                self.name, self.state
            )));
        }
        self.state = SessionState::Done;
        tracing::debug!(session = self.id.0, source = %self.name, "Capture complete");
        Ok(SessionProgress::Completed)
    }

    /// The finished capture as compositor input.
    pub fn composite_source(&self) -> Option<CompositeSource<'_>> {
        if self.state != SessionState::Done {
            return None;
        }
        let buffer = self.buffer.as_ref()?;
        Some(CompositeSource {
            name: &self.name,
            logical: self.logical,
            transform: self.transform,
            y_invert: self.y_invert,
            buffer: BufferView {
                format: buffer.format,
                width: buffer.width,
                height: buffer.height,
                stride: buffer.stride,
                data: &buffer.data,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeapAllocator, TransportCapabilities};
    use crate::event::{FailureReason, TransportEvent};
    use wlgrab_platform_linux::{OutputId, ResolvedGeometry, ToplevelId};

    /// Records requests; never produces events on its own.
    #[derive(Default)]
    struct RecordingTransport {
        copies: Vec<SessionId>,
        frames: Vec<SessionId>,
    }

    impl CaptureTransport for RecordingTransport {
        fn capabilities(&self) -> TransportCapabilities {
            TransportCapabilities::all()
        }

        fn capture_output_screencopy(
            &mut self,
            _session: SessionId,
            _output: OutputId,
            _with_cursor: bool,
        ) -> WlgrabResult<()> {
            Ok(())
        }

        fn create_image_copy_session(
            &mut self,
            _session: SessionId,
            _target: CaptureTarget,
            _with_cursor: bool,
        ) -> WlgrabResult<()> {
            Ok(())
        }

        fn copy_screencopy_frame(
            &mut self,
            session: SessionId,
            _buffer: &mut ShmBuffer,
        ) -> WlgrabResult<()> {
            self.copies.push(session);
            Ok(())
        }

        fn capture_image_copy_frame(
            &mut self,
            session: SessionId,
            _buffer: &mut ShmBuffer,
        ) -> WlgrabResult<()> {
            self.frames.push(session);
            Ok(())
        }

        fn dispatch(&mut self) -> WlgrabResult<Vec<TransportEvent>> {
            Ok(Vec::new())
        }
    }

    fn output() -> ResolvedOutput {
        ResolvedOutput {
            id: OutputId(1),
            name: Some("DP-1".to_string()),
            geometry: ResolvedGeometry {
                logical: LogicalBox::new(0, 0, 1920, 1080),
                scale: 1.0,
                transform: OutputTransform::Rotate90,
            },
        }
    }

    fn feed(
        session: &mut CaptureSession,
        transport: &mut RecordingTransport,
        allocator: &mut HeapAllocator,
        event: impl Into<CaptureEvent>,
    ) -> WlgrabResult<SessionProgress> {
        session.handle_event(event.into(), transport, allocator)
    }

    #[test]
    fn screencopy_goes_straight_to_copying() {
        let mut session = CaptureSession::for_output(SessionId(1), &output(), ProtocolVariant::Screencopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();

        let buffer = ScreencopyEvent::Buffer {
            format: ShmFormat::XRGB8888,
            width: 1080,
            height: 1920,
            stride: 1080 * 4 + 64,
        };
        feed(&mut session, &mut transport, &mut allocator, buffer.clone()).unwrap();
        assert_eq!(session.state(), SessionState::Copying);
        assert_eq!(session.buffer().unwrap().stride, 1080 * 4 + 64);

        // A second announcement while copying allocates nothing.
        feed(&mut session, &mut transport, &mut allocator, buffer).unwrap();
        assert_eq!(transport.copies, vec![SessionId(1)]);

        feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ScreencopyEvent::Flags { y_invert: true },
        )
        .unwrap();
        let progress = feed(&mut session, &mut transport, &mut allocator, ScreencopyEvent::Ready).unwrap();
        assert_eq!(progress, SessionProgress::Completed);
        assert_eq!(session.state(), SessionState::Done);

        let source = session.composite_source().unwrap();
        assert!(source.y_invert);
        assert_eq!(source.transform, OutputTransform::Rotate90);
        assert_eq!(source.logical, LogicalBox::new(0, 0, 1920, 1080));
    }

    #[test]
    fn screencopy_rejects_unsupported_format_before_allocating() {
        let mut session = CaptureSession::for_output(SessionId(1), &output(), ProtocolVariant::Screencopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();

        let err = feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ScreencopyEvent::Buffer {
                format: ShmFormat(0x3231_564e), // NV12
                width: 16,
                height: 16,
                stride: 16,
            },
        )
        .unwrap_err();
        assert!(matches!(err, WlgrabError::UnsupportedFormat { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(allocator.allocated_bytes(), 0);
    }

    #[test]
    fn screencopy_failure_names_the_source() {
        let mut session = CaptureSession::for_output(SessionId(1), &output(), ProtocolVariant::Screencopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();
        let err = feed(&mut session, &mut transport, &mut allocator, ScreencopyEvent::Failed).unwrap_err();
        assert_eq!(err.to_string(), "Failed to copy DP-1: compositor reported failure");
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn image_copy_keeps_first_supported_format() {
        let mut session = CaptureSession::for_output(SessionId(4), &output(), ProtocolVariant::ImageCopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();

        for event in [
            ImageCopySessionEvent::ShmFormat(ShmFormat(0x3231_564e)),
            ImageCopySessionEvent::ShmFormat(ShmFormat::ABGR8888),
            ImageCopySessionEvent::ShmFormat(ShmFormat::XRGB8888),
        ] {
            feed(&mut session, &mut transport, &mut allocator, event).unwrap();
        }
        assert_eq!(session.state(), SessionState::Pending);
        feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ImageCopySessionEvent::BufferSize {
                width: 1080,
                height: 1920,
            },
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::BufferNegotiated);
        assert_eq!(session.format(), Some(ShmFormat::ABGR8888));

        feed(&mut session, &mut transport, &mut allocator, ImageCopySessionEvent::Done).unwrap();
        assert_eq!(session.state(), SessionState::Copying);
        assert_eq!(session.buffer().unwrap().stride, 1080 * 4);

        // Constraints may be re-sent; the outstanding frame is kept.
        feed(&mut session, &mut transport, &mut allocator, ImageCopySessionEvent::Done).unwrap();
        assert_eq!(transport.frames, vec![SessionId(4)]);

        feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ImageCopyFrameEvent::Transform(OutputTransform::Flipped),
        )
        .unwrap();
        let progress = feed(&mut session, &mut transport, &mut allocator, ImageCopyFrameEvent::Ready).unwrap();
        assert_eq!(progress, SessionProgress::Completed);
        assert_eq!(session.transform(), OutputTransform::Flipped);
    }

    #[test]
    fn image_copy_without_supported_format_fails_on_settle() {
        let mut session = CaptureSession::for_output(SessionId(2), &output(), ProtocolVariant::ImageCopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();
        feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ImageCopySessionEvent::BufferSize { width: 8, height: 8 },
        )
        .unwrap();
        let err = feed(&mut session, &mut transport, &mut allocator, ImageCopySessionEvent::Done).unwrap_err();
        assert!(matches!(err, WlgrabError::UnsupportedFormat { .. }));
        assert_eq!(allocator.allocated_bytes(), 0);
        assert!(transport.frames.is_empty());
    }

    #[test]
    fn frame_failure_aborts_regardless_of_reason() {
        for reason in [
            FailureReason::Unknown,
            FailureReason::BufferConstraints,
            FailureReason::Stopped,
        ] {
            let mut session = CaptureSession::for_output(SessionId(2), &output(), ProtocolVariant::ImageCopy);
            let mut transport = RecordingTransport::default();
            let mut allocator = HeapAllocator::new();
            let result = feed(
                &mut session,
                &mut transport,
                &mut allocator,
                ImageCopyFrameEvent::Failed(reason),
            );
            assert!(matches!(result, Err(WlgrabError::CaptureFailed { .. })));
            assert_eq!(session.state(), SessionState::Failed);
        }
    }

    #[test]
    fn toplevel_geometry_comes_from_buffer_size() {
        let toplevel = ToplevelInfo {
            id: ToplevelId(3),
            identifier: Some("abc".to_string()),
            title: Some("Editor".to_string()),
            app_id: None,
            closed: false,
        };
        let mut session = CaptureSession::for_toplevel(SessionId(9), &toplevel);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();
        feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ImageCopySessionEvent::BufferSize {
                width: 800,
                height: 600,
            },
        )
        .unwrap();
        assert_eq!(session.logical(), LogicalBox::new(0, 0, 800, 600));
        assert_eq!(session.kind(), SourceKind::Toplevel);
    }

    #[test]
    fn ready_before_copy_is_a_protocol_error() {
        let mut session = CaptureSession::for_output(SessionId(1), &output(), ProtocolVariant::Screencopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();
        assert!(feed(&mut session, &mut transport, &mut allocator, ScreencopyEvent::Ready).is_err());
        assert!(session.composite_source().is_none());
    }

    #[test]
    fn mismatched_protocol_events_are_rejected() {
        let mut session = CaptureSession::for_output(SessionId(1), &output(), ProtocolVariant::Screencopy);
        let mut transport = RecordingTransport::default();
        let mut allocator = HeapAllocator::new();
        let result = feed(
            &mut session,
            &mut transport,
            &mut allocator,
            ImageCopySessionEvent::Done,
        );
        assert!(matches!(result, Err(WlgrabError::Transport { .. })));
    }
}
