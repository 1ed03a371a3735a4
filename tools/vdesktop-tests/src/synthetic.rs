//! Preset virtual desktops painted with marker patterns.

use clap::ValueEnum;
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use serde::Serialize;
use wlgrab_capture_engine::backend::{SyntheticCompositor, SyntheticOutput, SyntheticToplevel};
use wlgrab_capture_engine::TransportCapabilities;
use wlgrab_platform_core::{LogicalBox, OutputTransform};

/// Marker edge length, logical pixels.
pub const MARKER_SIZE: u32 = 40;

/// Identifier of the window in the toplevel preset.
pub const WINDOW_IDENTIFIER: &str = "vdesktop-window";

const RED: [u8; 3] = [230, 40, 40];
const GREEN: [u8; 3] = [40, 220, 60];
const BLUE: [u8; 3] = [40, 70, 235];
const YELLOW: [u8; 3] = [240, 220, 30];
const MAGENTA: [u8; 3] = [220, 40, 220];
const CYAN: [u8; 3] = [30, 220, 230];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Two side-by-side outputs, the second at scale 2.
    Dual,
    /// A portrait output rotated by 90° next to a landscape one.
    Rotated,
    /// A fractionally scaled (1.5) laptop panel next to a 1x monitor.
    Hidpi,
    /// Mirrored outputs, one of them delivering bottom-up rows.
    Flipped,
    /// One output and one application window.
    Toplevel,
}

/// A solid square whose centre must come out in a known colour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub name: &'static str,
    /// Centre, logical pixels.
    pub x: i32,
    pub y: i32,
    pub rgb: [u8; 3],
}

const fn marker(name: &'static str, x: i32, y: i32, rgb: [u8; 3]) -> Marker {
    Marker { name, x, y, rgb }
}

/// A ready-to-capture desktop and what it should look like.
pub struct Scene {
    pub compositor: SyntheticCompositor,
    /// Markers in desktop coordinates.
    pub desktop_markers: Vec<Marker>,
    /// Markers in window coordinates, for toplevel captures.
    pub window_markers: Vec<Marker>,
}

impl Preset {
    pub fn build(self) -> Scene {
        match self {
            Preset::Dual => {
                let markers = vec![
                    marker("DP-1 top-left", 80, 80, RED),
                    marker("DP-1 bottom-right", 560, 280, GREEN),
                    marker("DP-2 top-left", 720, 80, BLUE),
                    marker("DP-2 bottom-right", 1200, 280, YELLOW),
                ];
                let compositor = SyntheticCompositor::new()
                    .with_output(paint_output(SyntheticOutput::new("DP-1", 640, 360), &markers))
                    .with_output(paint_output(
                        SyntheticOutput::new("DP-2", 1280, 720).at(640, 0).with_scale(2),
                        &markers,
                    ));
                Scene::desktop(compositor, markers)
            }
            Preset::Rotated => {
                let markers = vec![
                    marker("eDP-1 top", 80, 80, RED),
                    marker("eDP-1 bottom", 320, 560, GREEN),
                    marker("HDMI-A-1 top-left", 480, 80, BLUE),
                    marker("HDMI-A-1 bottom-right", 960, 280, MAGENTA),
                ];
                let compositor = SyntheticCompositor::new()
                    .with_output(paint_output(
                        SyntheticOutput::new("eDP-1", 640, 400).with_transform(OutputTransform::Rotate90),
                        &markers,
                    ))
                    .with_output(paint_output(
                        SyntheticOutput::new("HDMI-A-1", 640, 360).at(400, 0),
                        &markers,
                    ));
                Scene::desktop(compositor, markers)
            }
            Preset::Hidpi => {
                let markers = vec![
                    marker("eDP-1 top-left", 80, 80, RED),
                    marker("eDP-1 bottom-right", 560, 320, GREEN),
                    marker("DP-1 top-left", 720, 80, BLUE),
                    marker("DP-1 bottom-right", 1200, 280, YELLOW),
                ];
                let compositor = SyntheticCompositor::new()
                    .with_output(paint_output(
                        SyntheticOutput::new("eDP-1", 960, 600)
                            .with_scale(2)
                            .with_logical(LogicalBox::new(0, 0, 640, 400)),
                        &markers,
                    ))
                    .with_output(paint_output(
                        SyntheticOutput::new("DP-1", 640, 360).at(640, 0),
                        &markers,
                    ));
                Scene::desktop(compositor, markers)
            }
            Preset::Flipped => {
                let markers = vec![
                    marker("DP-1 top-left", 80, 80, RED),
                    marker("DP-1 bottom-right", 560, 280, GREEN),
                    marker("DP-2 top-left", 720, 80, BLUE),
                    marker("DP-2 bottom-right", 1200, 280, YELLOW),
                ];
                // Bottom-up rows only exist on the screencopy path.
                let capabilities = TransportCapabilities {
                    image_copy: false,
                    ..TransportCapabilities::all()
                };
                let compositor = SyntheticCompositor::new()
                    .with_capabilities(capabilities)
                    .with_output(paint_output(
                        SyntheticOutput::new("DP-1", 640, 360)
                            .with_transform(OutputTransform::Flipped180)
                            .y_inverted(),
                        &markers,
                    ))
                    .with_output(paint_output(
                        SyntheticOutput::new("DP-2", 640, 360)
                            .at(640, 0)
                            .with_transform(OutputTransform::Flipped),
                        &markers,
                    ));
                Scene::desktop(compositor, markers)
            }
            Preset::Toplevel => {
                let window_markers = vec![
                    marker("window top-left", 40, 40, RED),
                    marker("window centre", 160, 120, GREEN),
                    marker("window bottom-right", 280, 200, CYAN),
                ];
                let desktop_markers = vec![marker("DP-1 top-left", 80, 80, BLUE)];
                let window = paint(320, 240, LogicalBox::new(0, 0, 320, 240), &window_markers);
                let compositor = SyntheticCompositor::new()
                    .with_output(paint_output(
                        SyntheticOutput::new("DP-1", 640, 360),
                        &desktop_markers,
                    ))
                    .with_toplevel(
                        SyntheticToplevel::new(WINDOW_IDENTIFIER, 320, 240)
                            .with_title("Marker pattern")
                            .with_app_id("vdesktop")
                            .with_pixels(to_argb(&window)),
                    );
                Scene {
                    compositor,
                    desktop_markers,
                    window_markers,
                }
            }
        }
    }
}

impl Scene {
    fn desktop(compositor: SyntheticCompositor, desktop_markers: Vec<Marker>) -> Self {
        Self {
            compositor,
            desktop_markers,
            window_markers: Vec::new(),
        }
    }
}

/// Paint the markers that fall on `output` into its content.
fn paint_output(output: SyntheticOutput, markers: &[Marker]) -> SyntheticOutput {
    let logical = output.logical_box();
    let (width, height) = output.transform.apply_to_size(output.mode.0, output.mode.1);
    let image = paint(width, height, logical, markers);
    output.with_desktop_pixels(&to_argb(&image))
}

/// Background grid plus every marker inside `logical`, drawn at the
/// physical resolution `width`x`height`.
fn paint(width: u32, height: u32, logical: LogicalBox, markers: &[Marker]) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, Rgba([30, 30, 35, 255]));

    let line = Rgba([80, 80, 90, 255]);
    for x in (0..width).step_by(64) {
        draw_line_segment_mut(&mut img, (x as f32, 0.0), (x as f32, height as f32), line);
    }
    for y in (0..height).step_by(64) {
        draw_line_segment_mut(&mut img, (0.0, y as f32), (width as f32, y as f32), line);
    }
    draw_filled_circle_mut(
        &mut img,
        ((width / 2) as i32, (height / 2) as i32),
        (width.min(height) / 8) as i32,
        Rgba([200, 150, 50, 255]),
    );

    let fx = width as f64 / logical.width as f64;
    let fy = height as f64 / logical.height as f64;
    let half = MARKER_SIZE as f64 / 2.0;
    for m in markers {
        let inside = m.x >= logical.x
            && m.x < logical.right()
            && m.y >= logical.y
            && m.y < logical.bottom();
        if !inside {
            continue;
        }
        let left = ((m.x - logical.x) as f64 - half) * fx;
        let top = ((m.y - logical.y) as f64 - half) * fy;
        let rect = Rect::at(left.round() as i32, top.round() as i32).of_size(
            (MARKER_SIZE as f64 * fx).round() as u32,
            (MARKER_SIZE as f64 * fy).round() as u32,
        );
        draw_filled_rect_mut(&mut img, rect, Rgba([m.rgb[0], m.rgb[1], m.rgb[2], 255]));
    }
    img
}

/// Premultiplied ARGB words, row-major.
pub fn to_argb(image: &RgbaImage) -> Vec<u32> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            let premultiply = |c: u8| (c as u32 * a as u32 + 127) / 255;
            (a as u32) << 24 | premultiply(r) << 16 | premultiply(g) << 8 | premultiply(b)
        })
        .collect()
}
