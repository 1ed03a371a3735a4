//! End-to-end screenshot pipeline.
//!
//! ```text
//! discover ──► plan_capture ──► CaptureRegistry ──► render
//! (metadata)   (sources, region,  (sessions until     (canvas)
//!               scale)             all are done)
//! ```

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::LogicalBox;
use wlgrab_platform_linux::{LayoutSource, OutputLayout, ResolvedOutput, ToplevelInfo, ToplevelList};
use wlgrab_render_engine::{render, Canvas};

use crate::backend::{BufferAllocator, CaptureTransport, SourceEnumerator, TransportCapabilities};
use crate::registry::CaptureRegistry;
use crate::session::ProtocolVariant;

/// What the caller wants captured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenshotRequest {
    /// Region of the logical desktop. Defaults to everything captured.
    pub region: Option<LogicalBox>,
    /// Capture exactly this output.
    pub output_name: Option<String>,
    /// Capture the toplevel with this identifier.
    pub toplevel: Option<String>,
    /// Output image scale. Defaults to the greatest output scale.
    pub scale: Option<f64>,
    pub with_cursor: bool,
}

impl ScreenshotRequest {
    /// Reject contradictory selections.
    pub fn validate(&self) -> WlgrabResult<()> {
        if self.output_name.is_some() && self.region.is_some() {
            return Err(WlgrabError::config(
                "an output and a region are mutually exclusive",
            ));
        }
        if self.output_name.is_some() && self.toplevel.is_some() {
            return Err(WlgrabError::config(
                "an output and a toplevel are mutually exclusive",
            ));
        }
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(WlgrabError::config(format!(
                    "scale must be a positive number, got {scale}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything enumeration learned about the desktop.
#[derive(Debug, Clone)]
pub struct Desktop {
    pub capabilities: TransportCapabilities,
    pub layout: OutputLayout,
    pub layout_source: LayoutSource,
    pub toplevels: ToplevelList,
}

impl Desktop {
    pub fn resolve_outputs(&self) -> WlgrabResult<Vec<ResolvedOutput>> {
        self.layout.resolve(self.layout_source)
    }
}

/// Enumerate outputs and toplevels. The precise layout needs a second
/// roundtrip, as do toplevel lookups.
pub fn discover<E>(
    enumerator: &mut E,
    capabilities: TransportCapabilities,
    want_toplevels: bool,
) -> WlgrabResult<Desktop>
where
    E: SourceEnumerator + ?Sized,
{
    let mut layout = OutputLayout::new();
    let mut toplevels = ToplevelList::new();

    let mut absorb = |enumerator: &mut E| -> WlgrabResult<()> {
        let batch = enumerator.roundtrip()?;
        for (id, event) in batch.outputs {
            layout.apply(id, event);
        }
        for (id, event) in batch.toplevels {
            toplevels.apply(id, event);
        }
        Ok(())
    };

    absorb(&mut *enumerator)?;

    let precise = enumerator.has_precise_layout();
    if precise || want_toplevels {
        absorb(&mut *enumerator)?;
    }

    let layout_source = if precise {
        LayoutSource::Precise
    } else {
        tracing::warn!("Precise output layout isn't available, guessing the output layout");
        LayoutSource::Guess
    };

    tracing::debug!(
        outputs = layout.outputs().len(),
        toplevels = toplevels.toplevels().len(),
        ?layout_source,
        "Desktop enumerated"
    );

    Ok(Desktop {
        capabilities,
        layout,
        layout_source,
        toplevels,
    })
}

/// Which sources to capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSelection {
    Outputs(Vec<ResolvedOutput>),
    Toplevel(ToplevelInfo),
}

/// A validated capture plan.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePlan {
    pub selection: CaptureSelection,
    /// Protocol used for output captures.
    pub variant: ProtocolVariant,
    /// Fixed region, or `None` to use the extents of what gets captured.
    pub region: Option<LogicalBox>,
    pub scale: f64,
    pub with_cursor: bool,
}

impl CapturePlan {
    pub fn source_count(&self) -> usize {
        match &self.selection {
            CaptureSelection::Outputs(outputs) => outputs.len(),
            CaptureSelection::Toplevel(_) => 1,
        }
    }
}

/// Decide which sources to capture, the region and the scale.
///
/// Fails before any capture is requested, so an [`WlgrabError::EmptySelection`]
/// never leaves sessions behind.
pub fn plan_capture(request: &ScreenshotRequest, desktop: &Desktop) -> WlgrabResult<CapturePlan> {
    request.validate()?;

    let caps = desktop.capabilities;
    if !caps.shm {
        return Err(WlgrabError::unsupported("compositor doesn't support wl_shm"));
    }

    if let Some(identifier) = request.toplevel.as_deref() {
        if !caps.can_capture_toplevels() {
            return Err(WlgrabError::unsupported(
                "compositor doesn't support toplevel capture",
            ));
        }
        let toplevel = desktop
            .toplevels
            .find(identifier)
            .ok_or_else(|| WlgrabError::unknown_source("toplevel", identifier))?;
        return Ok(CapturePlan {
            selection: CaptureSelection::Toplevel(toplevel.clone()),
            variant: ProtocolVariant::ImageCopy,
            region: request.region,
            scale: request.scale.unwrap_or(1.0),
            with_cursor: request.with_cursor,
        });
    }

    if !caps.can_capture_outputs() {
        return Err(WlgrabError::unsupported(
            "compositor doesn't support the screen capture protocol",
        ));
    }
    if desktop.layout.is_empty() {
        return Err(WlgrabError::unsupported("compositor has no outputs"));
    }

    let outputs = desktop.resolve_outputs()?;

    let region = match request.output_name.as_deref() {
        Some(name) => {
            let output = outputs
                .iter()
                .find(|o| o.name.as_deref() == Some(name))
                .ok_or_else(|| WlgrabError::unknown_source("output", name))?;
            Some(output.geometry.logical)
        }
        None => request.region,
    };

    let selected: Vec<ResolvedOutput> = outputs
        .into_iter()
        .filter(|o| region.map_or(true, |r| r.intersects(&o.geometry.logical)))
        .collect();

    if selected.is_empty() {
        let described = region
            .map(|r| r.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        return Err(WlgrabError::empty_selection(described));
    }

    let scale = request.scale.unwrap_or_else(|| {
        selected
            .iter()
            .map(|o| o.geometry.scale)
            .fold(1.0, f64::max)
    });

    let variant = if caps.can_image_copy_outputs() {
        ProtocolVariant::ImageCopy
    } else {
        ProtocolVariant::Screencopy
    };

    Ok(CapturePlan {
        selection: CaptureSelection::Outputs(selected),
        variant,
        region,
        scale,
        with_cursor: request.with_cursor,
    })
}

/// Start every capture in the plan.
pub fn begin_captures(
    plan: &CapturePlan,
    registry: &mut CaptureRegistry,
    transport: &mut dyn CaptureTransport,
) -> WlgrabResult<()> {
    match &plan.selection {
        CaptureSelection::Outputs(outputs) => {
            for output in outputs {
                registry.begin_output(output, plan.variant, plan.with_cursor, transport)?;
            }
        }
        CaptureSelection::Toplevel(toplevel) => {
            registry.begin_toplevel(toplevel, plan.with_cursor, transport)?;
        }
    }
    Ok(())
}

/// A finished screenshot.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub canvas: Canvas,
    /// Logical region the canvas covers.
    pub region: LogicalBox,
    pub scale: f64,
    pub source_count: usize,
}

/// Enumerate, capture every selected source and composite the result.
pub fn take_screenshot<B>(
    request: &ScreenshotRequest,
    backend: &mut B,
    allocator: &mut dyn BufferAllocator,
) -> WlgrabResult<Screenshot>
where
    B: SourceEnumerator + CaptureTransport,
{
    request.validate()?;

    let capabilities = backend.capabilities();
    let desktop = discover(&mut *backend, capabilities, request.toplevel.is_some())?;
    let plan = plan_capture(request, &desktop)?;

    tracing::info!(
        sources = plan.source_count(),
        variant = ?plan.variant,
        scale = plan.scale,
        "Starting capture"
    );

    let mut registry = CaptureRegistry::new();
    begin_captures(&plan, &mut registry, backend)?;
    registry.wait_for_completion(backend, allocator)?;

    let region = plan
        .region
        .or_else(|| registry.layout_extents())
        .ok_or_else(|| WlgrabError::empty_selection("(none)"))?;

    let sources = registry.composite_sources()?;
    let canvas = render(&sources, region, plan.scale)?;

    tracing::info!(
        width = canvas.width(),
        height = canvas.height(),
        region = %region,
        "Screenshot composited"
    );

    Ok(Screenshot {
        canvas,
        region,
        scale: plan.scale,
        source_count: registry.total(),
    })
}
