//! Output metadata accumulation and logical geometry resolution.
//!
//! Output metadata arrives in two phases: the core output channel reports a
//! legacy position, the current mode, an integer scale and a transform; the
//! optional precise channel (xdg-output) later reports the logical position
//! and size the compositor actually uses for its layout. Events from both
//! phases may interleave, so [`OutputMetadata`] only accumulates state and
//! resolution is a pure function of what has been accumulated.

use serde::{Deserialize, Serialize};

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::{LogicalBox, OutputTransform};

/// Stable identifier of an output, assigned by the enumeration collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(pub u32);

/// Raw metadata events for one output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Legacy position in the compositor space and the output transform.
    Geometry {
        x: i32,
        y: i32,
        transform: OutputTransform,
    },
    /// A video mode. Only the current mode matters.
    Mode {
        width: i32,
        height: i32,
        current: bool,
    },
    /// Integer scale factor.
    Scale(i32),
    /// Connector name from the core channel.
    Name(String),
    Description(String),
    /// End of a core metadata batch.
    Done,
    /// Precise logical position.
    LogicalPosition { x: i32, y: i32 },
    /// Precise logical size.
    LogicalSize { width: i32, height: i32 },
    /// Name from the precise channel; the core name wins when both exist.
    LogicalName(String),
    /// End of a precise metadata batch.
    LogicalDone,
}

/// Accumulated metadata for one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub id: OutputId,
    pub name: Option<String>,

    /// Legacy position from the core channel.
    pub legacy_x: i32,
    pub legacy_y: i32,

    /// Current mode size in physical pixels, before the transform.
    pub mode_width: i32,
    pub mode_height: i32,

    pub transform: OutputTransform,

    /// Integer scale factor (defaults to 1).
    pub scale: i32,

    /// Precise logical geometry, once reported.
    pub logical_position: Option<(i32, i32)>,
    pub logical_size: Option<(i32, i32)>,
}

/// How logical geometry should be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSource {
    /// Use the precise logical geometry channel.
    Precise,
    /// The precise channel is unavailable; derive geometry from the mode.
    Guess,
}

/// Finalized layout of one output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedGeometry {
    pub logical: LogicalBox,
    /// Physical pixels per logical unit.
    pub scale: f64,
    pub transform: OutputTransform,
}

/// A resolved output, ready to be captured.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOutput {
    pub id: OutputId,
    pub name: Option<String>,
    pub geometry: ResolvedGeometry,
}

impl ResolvedOutput {
    /// Name used in logs and error messages.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("output #{}", self.id.0))
    }
}

impl OutputMetadata {
    pub fn new(id: OutputId) -> Self {
        Self {
            id,
            name: None,
            legacy_x: 0,
            legacy_y: 0,
            mode_width: 0,
            mode_height: 0,
            transform: OutputTransform::Normal,
            scale: 1,
            logical_position: None,
            logical_size: None,
        }
    }

    /// Fold one metadata event into the accumulated state.
    pub fn apply(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Geometry { x, y, transform } => {
                self.legacy_x = x;
                self.legacy_y = y;
                self.transform = transform;
            }
            OutputEvent::Mode {
                width,
                height,
                current,
            } => {
                if current {
                    self.mode_width = width;
                    self.mode_height = height;
                }
            }
            OutputEvent::Scale(factor) => self.scale = factor,
            OutputEvent::Name(name) => self.name = Some(name),
            OutputEvent::LogicalName(name) => {
                if self.name.is_none() {
                    self.name = Some(name);
                }
            }
            OutputEvent::LogicalPosition { x, y } => self.logical_position = Some((x, y)),
            OutputEvent::LogicalSize { width, height } => {
                self.logical_size = Some((width, height));
            }
            OutputEvent::Description(_) | OutputEvent::Done | OutputEvent::LogicalDone => {}
        }
    }

    fn has_mode(&self) -> bool {
        self.mode_width > 0 && self.mode_height > 0
    }

    /// Geometry from the precise channel. The scale is inferred from the
    /// transformed mode width over the logical width.
    ///
    /// Returns `None` until the mode, the logical position and a non-zero
    /// logical width are all known.
    pub fn resolve_precise(&self) -> Option<ResolvedGeometry> {
        let (x, y) = self.logical_position?;
        let (width, height) = self.logical_size?;
        if width <= 0 || height <= 0 || !self.has_mode() {
            return None;
        }
        let (mode_width, _) = self
            .transform
            .apply_to_size(self.mode_width, self.mode_height);
        Some(ResolvedGeometry {
            logical: LogicalBox::new(x, y, width, height),
            scale: mode_width as f64 / width as f64,
            transform: self.transform,
        })
    }

    /// Geometry guessed from the legacy position, the mode and the integer
    /// scale. Returns `None` until a mode is known.
    pub fn guess(&self) -> Option<ResolvedGeometry> {
        if !self.has_mode() || self.scale <= 0 {
            return None;
        }
        let (width, height) = self.transform.apply_to_size(
            self.mode_width / self.scale,
            self.mode_height / self.scale,
        );
        Some(ResolvedGeometry {
            logical: LogicalBox::new(self.legacy_x, self.legacy_y, width, height),
            scale: self.scale as f64,
            transform: self.transform,
        })
    }

    pub fn resolve(&self, source: LayoutSource) -> Option<ResolvedGeometry> {
        match source {
            LayoutSource::Precise => self.resolve_precise(),
            LayoutSource::Guess => self.guess(),
        }
    }
}

/// All outputs known to the enumeration phase, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct OutputLayout {
    outputs: Vec<OutputMetadata>,
}

impl OutputLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a metadata event to its output, creating the output on first
    /// sight.
    pub fn apply(&mut self, id: OutputId, event: OutputEvent) {
        tracing::trace!(output = id.0, ?event, "Output metadata event");
        let index = match self.outputs.iter().position(|o| o.id == id) {
            Some(index) => index,
            None => {
                self.outputs.push(OutputMetadata::new(id));
                self.outputs.len() - 1
            }
        };
        self.outputs[index].apply(event);
    }

    pub fn outputs(&self) -> &[OutputMetadata] {
        &self.outputs
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Finalize every output's geometry.
    pub fn resolve(&self, source: LayoutSource) -> WlgrabResult<Vec<ResolvedOutput>> {
        self.outputs
            .iter()
            .map(|output| {
                let geometry = output.resolve(source).ok_or_else(|| {
                    WlgrabError::transport(format!(
                        "output {} did not report a complete layout",
                        output
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("#{}", output.id.0))
                    ))
                })?;
                tracing::debug!(
                    output = ?output.name,
                    logical = %geometry.logical,
                    scale = geometry.scale,
                    transform = ?geometry.transform,
                    "Resolved output geometry"
                );
                Ok(ResolvedOutput {
                    id: output.id,
                    name: output.name.clone(),
                    geometry,
                })
            })
            .collect()
    }
}
