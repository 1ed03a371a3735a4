//! In-memory compositor for tests and the virtual desktop tool.
//!
//! [`SyntheticCompositor`] answers enumeration and capture requests the way
//! a Wayland compositor would, without a display connection. Content is
//! given as premultiplied ARGB words and encoded into whatever shm format
//! the capture negotiates.
//!
//! Outputs get `OutputId(1..)` and toplevels `ToplevelId(1..)` in the order
//! they were added.

use std::collections::VecDeque;

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::{LogicalBox, OutputTransform, ShmFormat};
use wlgrab_platform_linux::{OutputEvent, OutputId, ToplevelEvent, ToplevelId};

use super::{
    CaptureTarget, CaptureTransport, EnumerationBatch, SessionId, ShmBuffer, SourceEnumerator,
    TransportCapabilities,
};
use crate::event::{
    CaptureEvent, FailureReason, ImageCopyFrameEvent, ImageCopySessionEvent, ScreencopyEvent,
    TransportEvent,
};

#[derive(Debug, Clone, PartialEq)]
enum Content {
    Fill(u32),
    /// Row-major, buffer orientation.
    Pixels(Vec<u32>),
}

impl Content {
    fn pixel(&self, index: usize) -> u32 {
        match self {
            Content::Fill(argb) => *argb,
            Content::Pixels(pixels) => pixels.get(index).copied().unwrap_or(0),
        }
    }
}

/// A simulated monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticOutput {
    pub name: String,
    /// Legacy position reported on the core channel.
    pub position: (i32, i32),
    /// Current mode, physical pixels before the transform.
    pub mode: (u32, u32),
    pub scale: i32,
    pub transform: OutputTransform,
    /// Precise logical geometry. Derived from position, mode and scale
    /// when unset.
    pub logical: Option<LogicalBox>,
    /// Formats offered, in preference order. Screencopy offers the first.
    pub formats: Vec<ShmFormat>,
    pub y_invert: bool,
    pub fail: bool,
    /// Transform reported on image copy frames, if different.
    pub frame_transform: Option<OutputTransform>,
    content: Content,
}

impl SyntheticOutput {
    pub fn new(name: impl Into<String>, mode_width: u32, mode_height: u32) -> Self {
        Self {
            name: name.into(),
            position: (0, 0),
            mode: (mode_width, mode_height),
            scale: 1,
            transform: OutputTransform::Normal,
            logical: None,
            formats: vec![ShmFormat::XRGB8888],
            y_invert: false,
            fail: false,
            frame_transform: None,
            content: Content::Fill(0xff00_0000),
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.position = (x, y);
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_transform(mut self, transform: OutputTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_logical(mut self, logical: LogicalBox) -> Self {
        self.logical = Some(logical);
        self
    }

    pub fn with_formats(mut self, formats: Vec<ShmFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn y_inverted(mut self) -> Self {
        self.y_invert = true;
        self
    }

    /// Every capture of this output fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_frame_transform(mut self, transform: OutputTransform) -> Self {
        self.frame_transform = Some(transform);
        self
    }

    pub fn with_fill(mut self, argb: u32) -> Self {
        self.content = Content::Fill(argb);
        self
    }

    /// Buffer-oriented content, `mode.0 * mode.1` words.
    pub fn with_pixels(mut self, pixels: Vec<u32>) -> Self {
        self.content = Content::Pixels(pixels);
        self
    }

    /// Content as it should appear on the desktop: an image of the
    /// transformed mode size, converted to buffer orientation.
    pub fn with_desktop_pixels(mut self, pixels: &[u32]) -> Self {
        let (width, height) = self.mode;
        self.content = Content::Pixels(buffer_from_desktop(pixels, width, height, self.transform));
        self
    }

    /// Where the output sits on the desktop.
    pub fn logical_box(&self) -> LogicalBox {
        self.logical.unwrap_or_else(|| {
            let scale = self.scale.max(1);
            let (width, height) = self
                .transform
                .apply_to_size(self.mode.0 as i32 / scale, self.mode.1 as i32 / scale);
            LogicalBox::new(self.position.0, self.position.1, width, height)
        })
    }
}

/// A simulated application window.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticToplevel {
    pub identifier: String,
    pub title: String,
    pub app_id: String,
    pub size: (u32, u32),
    pub formats: Vec<ShmFormat>,
    pub fail: bool,
    content: Content,
}

impl SyntheticToplevel {
    pub fn new(identifier: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            identifier: identifier.into(),
            title: String::new(),
            app_id: String::new(),
            size: (width, height),
            formats: vec![ShmFormat::ARGB8888, ShmFormat::XRGB8888],
            fail: false,
            content: Content::Fill(0xff00_0000),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_fill(mut self, argb: u32) -> Self {
        self.content = Content::Fill(argb);
        self
    }

    pub fn with_pixels(mut self, pixels: Vec<u32>) -> Self {
        self.content = Content::Pixels(pixels);
        self
    }
}

/// A capture request the synthetic compositor received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticRequest {
    Screencopy {
        output: OutputId,
        with_cursor: bool,
    },
    ImageCopySession {
        target: CaptureTarget,
        with_cursor: bool,
    },
}

/// In-memory compositor implementing [`SourceEnumerator`] and
/// [`CaptureTransport`].
#[derive(Debug, Clone)]
pub struct SyntheticCompositor {
    outputs: Vec<SyntheticOutput>,
    toplevels: Vec<SyntheticToplevel>,
    capabilities: TransportCapabilities,
    precise_layout: bool,
    roundtrips: usize,
    sessions: Vec<(SessionId, CaptureTarget)>,
    requests: Vec<SyntheticRequest>,
    queue: VecDeque<TransportEvent>,
}

impl Default for SyntheticCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCompositor {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
            toplevels: Vec::new(),
            capabilities: TransportCapabilities::all(),
            precise_layout: true,
            roundtrips: 0,
            sessions: Vec::new(),
            requests: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn with_output(mut self, output: SyntheticOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_toplevel(mut self, toplevel: SyntheticToplevel) -> Self {
        self.toplevels.push(toplevel);
        self
    }

    pub fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Do not report precise logical geometry; clients must guess.
    pub fn without_precise_layout(mut self) -> Self {
        self.precise_layout = false;
        self
    }

    pub fn outputs(&self) -> &[SyntheticOutput] {
        &self.outputs
    }

    pub fn requests(&self) -> &[SyntheticRequest] {
        &self.requests
    }

    fn output(&self, id: OutputId) -> WlgrabResult<&SyntheticOutput> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.outputs.get(index))
            .ok_or_else(|| WlgrabError::transport(format!("no output with id {}", id.0)))
    }

    fn toplevel(&self, id: ToplevelId) -> WlgrabResult<&SyntheticToplevel> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.toplevels.get(index))
            .ok_or_else(|| WlgrabError::transport(format!("no toplevel with id {}", id.0)))
    }

    fn target_of(&self, session: SessionId) -> WlgrabResult<CaptureTarget> {
        self.sessions
            .iter()
            .find(|(id, _)| *id == session)
            .map(|(_, target)| *target)
            .ok_or_else(|| WlgrabError::transport(format!("unknown session {}", session.0)))
    }

    fn push(&mut self, session: SessionId, event: impl Into<CaptureEvent>) {
        self.queue.push_back(TransportEvent::new(session, event.into()));
    }

    fn core_output_events(&self, batch: &mut EnumerationBatch) {
        for (index, output) in self.outputs.iter().enumerate() {
            let id = OutputId(index as u32 + 1);
            let (width, height) = (output.mode.0 as i32, output.mode.1 as i32);
            let events = [
                OutputEvent::Geometry {
                    x: output.position.0,
                    y: output.position.1,
                    transform: output.transform,
                },
                OutputEvent::Mode {
                    width: 640,
                    height: 480,
                    current: false,
                },
                OutputEvent::Mode {
                    width,
                    height,
                    current: true,
                },
                OutputEvent::Scale(output.scale),
                OutputEvent::Name(output.name.clone()),
                OutputEvent::Description(format!("Synthetic output {}", output.name)),
                OutputEvent::Done,
            ];
            batch.outputs.extend(events.into_iter().map(|event| (id, event)));
        }
    }

    fn precise_output_events(&self, batch: &mut EnumerationBatch) {
        for (index, output) in self.outputs.iter().enumerate() {
            let id = OutputId(index as u32 + 1);
            let logical = output.logical_box();
            let events = [
                OutputEvent::LogicalPosition {
                    x: logical.x,
                    y: logical.y,
                },
                OutputEvent::LogicalSize {
                    width: logical.width,
                    height: logical.height,
                },
                OutputEvent::LogicalName(output.name.clone()),
                OutputEvent::LogicalDone,
            ];
            batch.outputs.extend(events.into_iter().map(|event| (id, event)));
        }
    }

    fn toplevel_events(&self, batch: &mut EnumerationBatch) {
        for (index, toplevel) in self.toplevels.iter().enumerate() {
            let id = ToplevelId(index as u32 + 1);
            let events = [
                ToplevelEvent::Identifier(toplevel.identifier.clone()),
                ToplevelEvent::Title(toplevel.title.clone()),
                ToplevelEvent::AppId(toplevel.app_id.clone()),
                ToplevelEvent::Done,
            ];
            batch.toplevels.extend(events.into_iter().map(|event| (id, event)));
        }
    }
}

impl SourceEnumerator for SyntheticCompositor {
    fn has_precise_layout(&self) -> bool {
        self.precise_layout
    }

    /// The first roundtrip reports core output metadata and toplevels, the
    /// second the precise layout.
    fn roundtrip(&mut self) -> WlgrabResult<EnumerationBatch> {
        let mut batch = EnumerationBatch::default();
        match self.roundtrips {
            0 => {
                self.core_output_events(&mut batch);
                if self.capabilities.toplevel_list {
                    self.toplevel_events(&mut batch);
                }
            }
            1 if self.precise_layout => self.precise_output_events(&mut batch),
            _ => {}
        }
        self.roundtrips += 1;
        Ok(batch)
    }
}

impl CaptureTransport for SyntheticCompositor {
    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    fn capture_output_screencopy(
        &mut self,
        session: SessionId,
        output: OutputId,
        with_cursor: bool,
    ) -> WlgrabResult<()> {
        if !self.capabilities.screencopy {
            return Err(WlgrabError::unsupported("screencopy is not available"));
        }
        let source = self.output(output)?;
        let format = source
            .formats
            .first()
            .copied()
            .unwrap_or(ShmFormat::XRGB8888);
        let (width, height) = source.mode;
        let stride = format.minimum_stride(width).unwrap_or(width * 4);

        self.sessions.push((session, CaptureTarget::Output(output)));
        self.requests.push(SyntheticRequest::Screencopy {
            output,
            with_cursor,
        });
        self.push(
            session,
            ScreencopyEvent::Buffer {
                format,
                width,
                height,
                stride,
            },
        );
        Ok(())
    }

    fn create_image_copy_session(
        &mut self,
        session: SessionId,
        target: CaptureTarget,
        with_cursor: bool,
    ) -> WlgrabResult<()> {
        let ((width, height), formats) = match target {
            CaptureTarget::Output(id) => {
                if !self.capabilities.can_image_copy_outputs() {
                    return Err(WlgrabError::unsupported("output image capture is not available"));
                }
                let output = self.output(id)?;
                (output.mode, output.formats.clone())
            }
            CaptureTarget::Toplevel(id) => {
                if !self.capabilities.can_capture_toplevels() {
                    return Err(WlgrabError::unsupported("toplevel image capture is not available"));
                }
                let toplevel = self.toplevel(id)?;
                (toplevel.size, toplevel.formats.clone())
            }
        };

        self.sessions.push((session, target));
        self.requests.push(SyntheticRequest::ImageCopySession {
            target,
            with_cursor,
        });
        self.push(session, ImageCopySessionEvent::BufferSize { width, height });
        self.push(session, ImageCopySessionEvent::DmabufDevice);
        for format in formats {
            self.push(session, ImageCopySessionEvent::ShmFormat(format));
        }
        self.push(session, ImageCopySessionEvent::Done);
        Ok(())
    }

    fn copy_screencopy_frame(
        &mut self,
        session: SessionId,
        buffer: &mut ShmBuffer,
    ) -> WlgrabResult<()> {
        let CaptureTarget::Output(id) = self.target_of(session)? else {
            return Err(WlgrabError::transport("screencopy frame on a toplevel"));
        };
        let output = self.output(id)?;
        if output.fail {
            tracing::debug!(output = %output.name, "Synthetic screencopy forced to fail");
            self.push(session, ScreencopyEvent::Failed);
            return Ok(());
        }
        let y_invert = output.y_invert;
        fill_buffer(buffer, &output.content, y_invert);
        self.push(session, ScreencopyEvent::Flags { y_invert });
        self.push(session, ScreencopyEvent::Ready);
        Ok(())
    }

    fn capture_image_copy_frame(
        &mut self,
        session: SessionId,
        buffer: &mut ShmBuffer,
    ) -> WlgrabResult<()> {
        let (size, content, transform, fail) = match self.target_of(session)? {
            CaptureTarget::Output(id) => {
                let output = self.output(id)?;
                (
                    output.mode,
                    output.content.clone(),
                    output.frame_transform.unwrap_or(output.transform),
                    output.fail,
                )
            }
            CaptureTarget::Toplevel(id) => {
                let toplevel = self.toplevel(id)?;
                (
                    toplevel.size,
                    toplevel.content.clone(),
                    OutputTransform::Normal,
                    toplevel.fail,
                )
            }
        };
        if (buffer.width, buffer.height) != size {
            self.push(
                session,
                ImageCopyFrameEvent::Failed(FailureReason::BufferConstraints),
            );
            return Ok(());
        }
        if fail {
            tracing::debug!(session = session.0, "Synthetic frame capture forced to fail");
            self.push(session, ImageCopyFrameEvent::Failed(FailureReason::Unknown));
            return Ok(());
        }
        fill_buffer(buffer, &content, false);
        self.push(session, ImageCopyFrameEvent::Transform(transform));
        self.push(
            session,
            ImageCopyFrameEvent::Damage {
                x: 0,
                y: 0,
                width: size.0 as i32,
                height: size.1 as i32,
            },
        );
        self.push(session, ImageCopyFrameEvent::PresentationTime { sec: 0, nsec: 0 });
        self.push(session, ImageCopyFrameEvent::Ready);
        Ok(())
    }

    fn dispatch(&mut self) -> WlgrabResult<Vec<TransportEvent>> {
        if self.queue.is_empty() {
            return Err(WlgrabError::transport(
                "dispatch would block forever: no events pending",
            ));
        }
        Ok(self.queue.drain(..).collect())
    }
}

/// Encode content into the buffer's format. Unsupported formats are left
/// zeroed. With `y_invert` the rows are stored bottom-up.
fn fill_buffer(buffer: &mut ShmBuffer, content: &Content, y_invert: bool) {
    let Some(raster) = buffer.format.raster_format() else {
        return;
    };
    let bpp = raster.bytes_per_pixel();
    let (width, height, stride) = (
        buffer.width as usize,
        buffer.height as usize,
        buffer.stride as usize,
    );
    for y in 0..height {
        let source_row = if y_invert { height - 1 - y } else { y };
        let row = &mut buffer.data[y * stride..];
        for x in 0..width {
            raster.encode(content.pixel(source_row * width + x), &mut row[x * bpp..]);
        }
    }
}

/// Convert a desktop-oriented image into the buffer orientation a source
/// with `transform` produces. `buffer_width`/`buffer_height` are the
/// untransformed buffer dimensions; `desktop` holds the transformed size.
pub fn buffer_from_desktop(
    desktop: &[u32],
    buffer_width: u32,
    buffer_height: u32,
    transform: OutputTransform,
) -> Vec<u32> {
    let (bw, bh) = (buffer_width as i64, buffer_height as i64);
    let (dw, dh) = transform.apply_to_size(bw, bh);
    let angle = transform.rotation_radians();
    let (c, s) = (angle.cos().round() as i64, angle.sin().round() as i64);
    let flip = transform.flip_sign() as i64;

    let mut out = Vec::with_capacity((bw * bh) as usize);
    for by in 0..bh {
        for bx in 0..bw {
            // Pixel centres in doubled coordinates, relative to the centre.
            let u = 2 * bx + 1 - bw;
            let v = 2 * by + 1 - bh;
            let x = flip * (c * u - s * v);
            let y = s * u + c * v;
            let dx = (x + dw - 1) / 2;
            let dy = (y + dh - 1) / 2;
            out.push(desktop.get((dy * dw + dx) as usize).copied().unwrap_or(0));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferAllocator, HeapAllocator};

    #[test]
    fn enumeration_happens_in_two_phases() {
        let mut compositor = SyntheticCompositor::new()
            .with_output(SyntheticOutput::new("DP-1", 3840, 2160).with_scale(2))
            .with_toplevel(SyntheticToplevel::new("win-1", 100, 50).with_title("Terminal"));

        let first = compositor.roundtrip().unwrap();
        assert!(first
            .outputs
            .iter()
            .any(|(_, e)| matches!(e, OutputEvent::Scale(2))));
        assert_eq!(first.toplevels.len(), 4);
        assert!(!first
            .outputs
            .iter()
            .any(|(_, e)| matches!(e, OutputEvent::LogicalSize { .. })));

        let second = compositor.roundtrip().unwrap();
        assert!(second.outputs.contains(&(
            OutputId(1),
            OutputEvent::LogicalSize {
                width: 1920,
                height: 1080
            }
        )));
        assert!(compositor.roundtrip().unwrap().outputs.is_empty());
    }

    #[test]
    fn dispatch_without_pending_events_fails() {
        let mut compositor = SyntheticCompositor::new();
        assert!(compositor.dispatch().is_err());
    }

    #[test]
    fn screencopy_announces_buffer_then_fills_it() {
        let mut compositor = SyntheticCompositor::new()
            .with_output(SyntheticOutput::new("DP-1", 4, 2).with_fill(0xff11_2233));
        compositor
            .capture_output_screencopy(SessionId(1), OutputId(1), true)
            .unwrap();
        let events = compositor.dispatch().unwrap();
        assert_eq!(
            events[0].event,
            CaptureEvent::Screencopy(ScreencopyEvent::Buffer {
                format: ShmFormat::XRGB8888,
                width: 4,
                height: 2,
                stride: 16,
            })
        );

        let mut buffer = HeapAllocator::new()
            .allocate(ShmFormat::XRGB8888, 4, 2, 16)
            .unwrap();
        compositor
            .copy_screencopy_frame(SessionId(1), &mut buffer)
            .unwrap();
        let raster = ShmFormat::XRGB8888.raster_format().unwrap();
        assert_eq!(raster.decode(&buffer.data[12..]), 0xff11_2233);
        assert_eq!(
            compositor.requests(),
            &[SyntheticRequest::Screencopy {
                output: OutputId(1),
                with_cursor: true
            }]
        );
    }

    #[test]
    fn desktop_pixels_round_trip_through_rotation() {
        // 3x2 buffer on a 90 degree output shows as a 2x3 desktop image.
        let desktop: Vec<u32> = (0..6).collect();
        let buffer = buffer_from_desktop(&desktop, 3, 2, OutputTransform::Normal);
        assert_eq!(buffer, desktop);

        let rotated = buffer_from_desktop(&desktop, 3, 2, OutputTransform::Rotate90);
        assert_eq!(rotated.len(), 6);
        let mut sorted = rotated.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, desktop);

        let flipped = buffer_from_desktop(&desktop, 3, 2, OutputTransform::Flipped);
        assert_eq!(flipped, vec![2, 1, 0, 5, 4, 3]);
    }
}
