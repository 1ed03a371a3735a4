//! The set of capture sessions belonging to one screenshot.

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::LogicalBox;
use wlgrab_platform_linux::{ResolvedOutput, ToplevelInfo};
use wlgrab_render_engine::CompositeSource;

use crate::backend::{BufferAllocator, CaptureTransport, SessionId};
use crate::event::TransportEvent;
use crate::session::{CaptureSession, ProtocolVariant, SessionProgress};

/// Owns every capture session and tracks how many have completed.
///
/// Sessions are kept in creation order, which is also the order the
/// compositor draws them in.
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    sessions: Vec<CaptureSession>,
    completed: usize,
    next_id: u32,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId(self.next_id)
    }

    /// Start capturing an output.
    pub fn begin_output(
        &mut self,
        output: &ResolvedOutput,
        variant: ProtocolVariant,
        with_cursor: bool,
        transport: &mut dyn CaptureTransport,
    ) -> WlgrabResult<SessionId> {
        let id = self.allocate_id();
        let session = CaptureSession::for_output(id, output, variant);
        self.begin(session, with_cursor, transport)
    }

    /// Start capturing a toplevel.
    pub fn begin_toplevel(
        &mut self,
        toplevel: &ToplevelInfo,
        with_cursor: bool,
        transport: &mut dyn CaptureTransport,
    ) -> WlgrabResult<SessionId> {
        let id = self.allocate_id();
        let session = CaptureSession::for_toplevel(id, toplevel);
        self.begin(session, with_cursor, transport)
    }

    fn begin(
        &mut self,
        mut session: CaptureSession,
        with_cursor: bool,
        transport: &mut dyn CaptureTransport,
    ) -> WlgrabResult<SessionId> {
        session.start(transport, with_cursor)?;
        let id = session.id();
        self.sessions.push(session);
        Ok(id)
    }

    /// Route an event to its session.
    pub fn handle_event(
        &mut self,
        event: TransportEvent,
        transport: &mut dyn CaptureTransport,
        allocator: &mut dyn BufferAllocator,
    ) -> WlgrabResult<()> {
        let total = self.sessions.len();
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id() == event.session)
            .ok_or_else(|| {
                WlgrabError::transport(format!("event for unknown session {}", event.session.0))
            })?;
        if session.handle_event(event.event, transport, allocator)? == SessionProgress::Completed {
            self.completed += 1;
            tracing::info!(
                source = %session.name(),
                done = self.completed,
                total,
                "Source captured"
            );
        }
        Ok(())
    }

    pub fn completed_count(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.sessions.len()
    }

    pub fn sessions(&self) -> &[CaptureSession] {
        &self.sessions
    }

    /// Dispatch transport events until every session is done. Any failure
    /// aborts immediately.
    pub fn wait_for_completion(
        &mut self,
        transport: &mut dyn CaptureTransport,
        allocator: &mut dyn BufferAllocator,
    ) -> WlgrabResult<()> {
        while !self.is_complete() {
            let events = transport.dispatch().map_err(|e| {
                WlgrabError::transport(format!(
                    "failed to capture all sources ({} of {} done): {e}",
                    self.completed,
                    self.sessions.len()
                ))
            })?;
            for event in events {
                self.handle_event(event, transport, allocator)?;
            }
        }
        Ok(())
    }

    /// Bounding box of every captured region, `None` without sessions.
    pub fn layout_extents(&self) -> Option<LogicalBox> {
        let boxes: Vec<LogicalBox> = self.sessions.iter().map(CaptureSession::logical).collect();
        LogicalBox::extents(&boxes)
    }

    /// Completed sessions as compositor input, in creation order.
    pub fn composite_sources(&self) -> WlgrabResult<Vec<CompositeSource<'_>>> {
        self.sessions
            .iter()
            .map(|session| {
                session.composite_source().ok_or_else(|| {
                    WlgrabError::capture_failed(
                        session.name(),
                        format!("capture not finished ({:?})", session.state()),
                    )
                })
            })
            .collect()
    }
}
