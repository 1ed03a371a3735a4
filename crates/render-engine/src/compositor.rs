//! Multi-source compositor.
//!
//! Every captured buffer is mapped onto one canvas covering a logical
//! region at a global scale. The mapping of one source is an affine
//! transform built from its logical geometry, its output transform and
//! whether its rows are stored bottom-up:
//!
//! ```text
//! buffer px ─► centre ─► scale to logical ─► rotate ─► flip ─► un-centre
//!           ─► offset within region ─► global scale ─► canvas px
//! ```
//!
//! The canvas is sampled back through the inverse transform, with bilinear
//! filtering for upscales and light downscales and a Lanczos-2 convolution
//! for heavier downscales.

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::{LogicalBox, OutputTransform};

use crate::raster::{over, BufferView, Canvas, ConvolutionTaps, SourceImage};
use crate::transform::Affine2D;

/// One 16.16 fixed-point unit. Coordinates closer than this to an integer
/// count as integral.
pub const GRID_EPSILON: f64 = 1.0 / 65536.0;

/// Minimum magnification (per axis) for bilinear filtering.
pub const FILTER_THRESHOLD: f64 = 0.75;

/// A finished capture, ready to be composited.
#[derive(Debug, Clone, Copy)]
pub struct CompositeSource<'a> {
    pub name: &'a str,
    /// Where the source sits on the logical desktop.
    pub logical: LogicalBox,
    pub transform: OutputTransform,
    /// Rows are stored bottom-up.
    pub y_invert: bool,
    pub buffer: BufferView<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    Bilinear,
    /// Separable Lanczos-2 convolution; sizes are source pixels per canvas
    /// pixel along each axis (never below 1).
    Convolution { x_size: f64, y_size: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Copy source pixels, alpha included.
    Replace,
    /// Blend source over what is already on the canvas.
    Over,
}

/// Canvas pixels touched by one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeRegion {
    pub dest: LogicalBox,
    /// All four extreme corner coordinates fall on the pixel grid.
    pub grid_aligned: bool,
}

/// Everything decided about one source before any pixel is touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositePlan {
    /// Buffer pixel space to canvas pixel space.
    pub forward: Affine2D,
    /// Canvas pixel space to buffer pixel space.
    pub inverse: Affine2D,
    pub region: CompositeRegion,
    pub filter: Filter,
    pub operator: Operator,
}

fn near_integer(v: f64) -> bool {
    (v - v.round()).abs() <= GRID_EPSILON
}

fn snap(v: f64) -> f64 {
    if near_integer(v) {
        v.round()
    } else {
        v
    }
}

/// Canvas dimensions for a region at `scale`.
pub fn canvas_size(region: LogicalBox, scale: f64) -> (u32, u32) {
    let dim = |v: i32| -> u32 {
        let scaled = (v.max(0) as f64 * scale - GRID_EPSILON).ceil();
        if scaled <= 0.0 {
            0
        } else {
            scaled.min(u32::MAX as f64) as u32
        }
    };
    (dim(region.width), dim(region.height))
}

/// Forward transform of one source: buffer pixel to canvas pixel.
pub fn source_transform(source: &CompositeSource<'_>, region: LogicalBox, scale: f64) -> Affine2D {
    let buffer_width = source.buffer.width as f64;
    let buffer_height = source.buffer.height as f64;
    let (raw_width, raw_height) = source
        .transform
        .apply_to_size(buffer_width, buffer_height);
    let logical_width = source.logical.width as f64;
    let logical_height = source.logical.height as f64;
    let flip_y = if source.y_invert { -1.0 } else { 1.0 };
    let angle = source.transform.rotation_radians();

    Affine2D::IDENTITY
        .then_translate(-buffer_width / 2.0, -buffer_height / 2.0)
        .then_scale(
            logical_width / raw_width,
            logical_height * flip_y / raw_height,
        )
        .then_rotate(angle.cos().round(), angle.sin().round())
        .then_scale(source.transform.flip_sign(), 1.0)
        .then_translate(logical_width / 2.0, logical_height / 2.0)
        .then_translate(
            (source.logical.x - region.x) as f64,
            (source.logical.y - region.y) as f64,
        )
        .then_scale(scale, scale)
}

/// Map the buffer's corners through `forward` and round outwards to the
/// enclosing pixel box.
pub fn compute_composite_region(forward: &Affine2D, width: u32, height: u32) -> CompositeRegion {
    let (w, h) = (width as f64, height as f64);
    let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)].map(|(x, y)| forward.apply(x, y));

    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    let grid_aligned = [x_min, x_max, y_min, y_max].into_iter().all(near_integer);

    let x1 = snap(x_min).floor() as i32;
    let x2 = snap(x_max).ceil() as i32;
    let y1 = snap(y_min).floor() as i32;
    let y2 = snap(y_max).ceil() as i32;

    CompositeRegion {
        dest: LogicalBox::new(x1, y1, x2 - x1, y2 - y1),
        grid_aligned,
    }
}

/// Bilinear when both magnifications are at least [`FILTER_THRESHOLD`].
pub fn select_filter(x_scale: f64, y_scale: f64) -> Filter {
    if x_scale >= FILTER_THRESHOLD && y_scale >= FILTER_THRESHOLD {
        Filter::Bilinear
    } else {
        Filter::Convolution {
            x_size: (1.0 / x_scale).max(1.0),
            y_size: (1.0 / y_scale).max(1.0),
        }
    }
}

/// Copying is only correct when the source neither overlaps another one
/// nor has fractional edges.
pub fn select_operator(grid_aligned: bool, overlapping: bool) -> Operator {
    if grid_aligned && !overlapping {
        Operator::Replace
    } else {
        Operator::Over
    }
}

/// Decide geometry, filter and operator for `sources[index]`.
pub fn plan_composite(
    sources: &[CompositeSource<'_>],
    index: usize,
    region: LogicalBox,
    scale: f64,
) -> WlgrabResult<CompositePlan> {
    let source = sources
        .get(index)
        .ok_or_else(|| WlgrabError::render(format!("no source at index {index}")))?;
    if source.buffer.width == 0 || source.buffer.height == 0 {
        return Err(WlgrabError::render(format!(
            "{} has an empty buffer",
            source.name
        )));
    }

    let forward = source_transform(source, region, scale);
    let inverse = forward.invert().ok_or_else(|| {
        WlgrabError::render(format!(
            "{} maps onto a degenerate area ({} at scale {scale})",
            source.name, source.logical
        ))
    })?;
    let composite_region =
        compute_composite_region(&forward, source.buffer.width, source.buffer.height);
    let filter = select_filter(forward.x_scale(), forward.y_scale());

    let overlapping = sources
        .iter()
        .enumerate()
        .any(|(i, other)| i != index && source.logical.intersects(&other.logical));
    let operator = select_operator(composite_region.grid_aligned, overlapping);

    Ok(CompositePlan {
        forward,
        inverse,
        region: composite_region,
        filter,
        operator,
    })
}

/// Composite every source onto a canvas covering `region` at `scale`.
/// Sources are drawn in order; later sources end up on top.
pub fn render(sources: &[CompositeSource<'_>], region: LogicalBox, scale: f64) -> WlgrabResult<Canvas> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(WlgrabError::render(format!("invalid scale {scale}")));
    }
    let (width, height) = canvas_size(region, scale);
    let mut canvas = Canvas::new(width, height)?;
    tracing::debug!(width, height, region = %region, scale, "Allocated canvas");

    for (index, source) in sources.iter().enumerate() {
        let plan = plan_composite(sources, index, region, scale)?;
        let image = SourceImage::decode(&source.buffer, source.name)?;

        tracing::debug!(
            source = source.name,
            dest = %plan.region.dest,
            grid_aligned = plan.region.grid_aligned,
            filter = ?plan.filter,
            operator = ?plan.operator,
            "Compositing source"
        );

        draw(&mut canvas, &image, &plan);
    }

    Ok(canvas)
}

fn draw(canvas: &mut Canvas, image: &SourceImage, plan: &CompositePlan) {
    let dest = plan.region.dest;
    let x_start = dest.x.max(0) as u32;
    let y_start = dest.y.max(0) as u32;
    let x_end = dest.right().clamp(0, canvas.width() as i32) as u32;
    let y_end = dest.bottom().clamp(0, canvas.height() as i32) as u32;

    let mut taps = match plan.filter {
        Filter::Bilinear => ConvolutionTaps::default(),
        Filter::Convolution { x_size, y_size } => ConvolutionTaps::with_sizes(x_size, y_size),
    };

    for y in y_start..y_end {
        for x in x_start..x_end {
            let (sx, sy) = plan.inverse.apply(x as f64 + 0.5, y as f64 + 0.5);
            let sample = match plan.filter {
                Filter::Bilinear => image.sample_bilinear(sx, sy),
                Filter::Convolution { x_size, y_size } => {
                    image.sample_convolution(sx, sy, x_size, y_size, &mut taps)
                }
            };
            let pixel = canvas.pixel_mut(x, y);
            *pixel = match plan.operator {
                Operator::Replace => sample,
                Operator::Over => over(sample, *pixel),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wlgrab_platform_core::ShmFormat;

    fn source<'a>(
        name: &'a str,
        logical: LogicalBox,
        transform: OutputTransform,
        width: u32,
        height: u32,
        data: &'a [u8],
    ) -> CompositeSource<'a> {
        CompositeSource {
            name,
            logical,
            transform,
            y_invert: false,
            buffer: BufferView {
                format: ShmFormat::XRGB8888,
                width,
                height,
                stride: width * 4,
                data,
            },
        }
    }

    fn solid(width: u32, height: u32, argb: u32) -> Vec<u8> {
        let raster = ShmFormat::XRGB8888.raster_format().unwrap();
        let mut data = vec![0u8; (width * height * 4) as usize];
        for px in data.chunks_exact_mut(4) {
            raster.encode(argb, px);
        }
        data
    }

    #[test]
    fn quarter_turn_buffers_land_where_worked_out_by_hand() {
        // 2x3 buffer, pixel (bx, by) at index by * 2 + bx.
        let words = [
            0xff11_1111, 0xff22_2222,
            0xff33_3333, 0xff44_4444,
            0xff55_5555, 0xff66_6666,
        ];
        let raster = ShmFormat::XRGB8888.raster_format().unwrap();
        let mut data = vec![0u8; words.len() * 4];
        for (px, &argb) in data.chunks_exact_mut(4).zip(&words) {
            raster.encode(argb, px);
        }
        let logical = LogicalBox::new(0, 0, 3, 2);

        // Rotate90: buffer (bx, by) lands on canvas (2 - by, bx).
        let sources = [source("rot", logical, OutputTransform::Rotate90, 2, 3, &data)];
        let canvas = render(&sources, logical, 1.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (3, 2));
        assert_eq!(
            canvas.pixels(),
            &[
                0xff55_5555, 0xff33_3333, 0xff11_1111,
                0xff66_6666, 0xff44_4444, 0xff22_2222,
            ]
        );

        // Flipped270: buffer (bx, by) lands on canvas (2 - by, 1 - bx).
        let sources = [source("flip", logical, OutputTransform::Flipped270, 2, 3, &data)];
        let canvas = render(&sources, logical, 1.0).unwrap();
        assert_eq!(
            canvas.pixels(),
            &[
                0xff66_6666, 0xff44_4444, 0xff22_2222,
                0xff55_5555, 0xff33_3333, 0xff11_1111,
            ]
        );
    }

    #[test]
    fn side_by_side_outputs_are_copied() {
        let left = LogicalBox::new(0, 0, 1920, 1080);
        let right = LogicalBox::new(1920, 0, 1920, 1080);
        let sources = [
            source("DP-1", left, OutputTransform::Normal, 1920, 1080, &[]),
            source("DP-2", right, OutputTransform::Normal, 1920, 1080, &[]),
        ];
        let region = LogicalBox::extents(&[left, right]).unwrap();
        assert_eq!(canvas_size(region, 1.0), (3840, 1080));

        for index in 0..2 {
            let plan = plan_composite(&sources, index, region, 1.0).unwrap();
            assert!(plan.region.grid_aligned);
            assert_eq!(plan.operator, Operator::Replace);
            assert_eq!(plan.filter, Filter::Bilinear);
        }
        let plan = plan_composite(&sources, 1, region, 1.0).unwrap();
        assert_eq!(plan.region.dest, right);
    }

    #[test]
    fn quarter_turn_portrait_buffer_fills_landscape_box() {
        let logical = LogicalBox::new(0, 0, 1920, 1080);
        let sources = [source("DSI-1", logical, OutputTransform::Rotate90, 1080, 1920, &[])];
        let plan = plan_composite(&sources, 0, logical, 1.0).unwrap();

        assert_eq!(plan.region.dest, LogicalBox::new(0, 0, 1920, 1080));
        assert!(plan.region.grid_aligned);
        let (x, y) = plan.forward.apply(1080.0, 1920.0);
        assert!((x - 0.0).abs() < 1e-9 && (y - 1080.0).abs() < 1e-9);
        assert_eq!(plan.operator, Operator::Replace);
    }

    #[test]
    fn cardinal_transforms_cover_logical_times_scale() {
        let logical = LogicalBox::new(100, 50, 640, 480);
        let region = LogicalBox::new(0, 0, 1000, 1000);
        for raw in 0..8 {
            let transform = OutputTransform::from_raw(raw).unwrap();
            let (bw, bh) = transform.apply_to_size(1280, 960);
            let src = source("out", logical, transform, bw, bh, &[]);
            let forward = source_transform(&src, region, 1.5);
            let r = compute_composite_region(&forward, bw, bh);
            assert_eq!(r.dest, LogicalBox::new(150, 75, 960, 720), "{transform:?}");
            assert!(r.grid_aligned);
        }
    }

    #[test]
    fn fractional_positions_are_not_grid_aligned() {
        let logical = LogicalBox::new(1, 0, 3, 2);
        let sources = [source("out", logical, OutputTransform::Normal, 3, 2, &[])];
        let plan = plan_composite(&sources, 0, LogicalBox::new(0, 0, 4, 2), 1.5).unwrap();
        assert!(!plan.region.grid_aligned);
        assert_eq!(plan.region.dest, LogicalBox::new(1, 0, 5, 3));
        assert_eq!(plan.operator, Operator::Over);
    }

    #[test]
    fn filter_switches_at_three_quarters() {
        assert_eq!(select_filter(0.75, 0.75), Filter::Bilinear);
        assert_eq!(select_filter(4.0, 1.0), Filter::Bilinear);
        match select_filter(0.74999, 0.75) {
            Filter::Convolution { x_size, y_size } => {
                assert!((x_size - 1.0 / 0.74999).abs() < 1e-12);
                assert!((y_size - 4.0 / 3.0).abs() < 1e-12);
            }
            Filter::Bilinear => panic!("expected convolution"),
        }
    }

    #[test]
    fn overlap_forces_blending() {
        assert_eq!(select_operator(true, false), Operator::Replace);
        assert_eq!(select_operator(true, true), Operator::Over);
        assert_eq!(select_operator(false, false), Operator::Over);

        let a = LogicalBox::new(0, 0, 100, 100);
        let b = LogicalBox::new(50, 50, 100, 100);
        let sources = [
            source("a", a, OutputTransform::Normal, 100, 100, &[]),
            source("b", b, OutputTransform::Normal, 100, 100, &[]),
        ];
        let region = LogicalBox::extents(&[a, b]).unwrap();
        for index in 0..2 {
            let plan = plan_composite(&sources, index, region, 1.0).unwrap();
            assert_eq!(plan.operator, Operator::Over);
        }
    }

    #[test]
    fn renders_solid_outputs_edge_to_edge() {
        let red = solid(4, 2, 0xffff_0000);
        let blue = solid(4, 2, 0xff00_00ff);
        let left = LogicalBox::new(0, 0, 4, 2);
        let right = LogicalBox::new(4, 0, 4, 2);
        let sources = [
            source("L", left, OutputTransform::Normal, 4, 2, &red),
            source("R", right, OutputTransform::Normal, 4, 2, &blue),
        ];
        let canvas = render(&sources, LogicalBox::new(0, 0, 8, 2), 1.0).unwrap();
        assert_eq!(canvas.width(), 8);
        assert_eq!(canvas.pixel(3, 1), Some(0xffff_0000));
        assert_eq!(canvas.pixel(4, 0), Some(0xff00_00ff));
    }

    #[test]
    fn hidpi_buffer_is_downscaled_with_convolution() {
        let grey = solid(16, 16, 0xff80_8080);
        let logical = LogicalBox::new(0, 0, 4, 4);
        let sources = [source("hidpi", logical, OutputTransform::Normal, 16, 16, &grey)];
        let plan = plan_composite(&sources, 0, logical, 1.0).unwrap();
        assert_eq!(
            plan.filter,
            Filter::Convolution {
                x_size: 4.0,
                y_size: 4.0
            }
        );
        let canvas = render(&sources, logical, 1.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (4, 4));
        // Away from the edges no transparent texels are involved.
        let px = canvas.pixel(1, 1).unwrap();
        assert_eq!(px >> 24, 0xff);
        let r = (px >> 16) & 0xff;
        assert!((0x70..=0x90).contains(&r), "got {px:#010x}");
    }

    #[test]
    fn regions_outside_every_source_stay_transparent() {
        let white = solid(2, 2, 0xffff_ffff);
        let sources = [source(
            "o",
            LogicalBox::new(0, 0, 2, 2),
            OutputTransform::Normal,
            2,
            2,
            &white,
        )];
        let canvas = render(&sources, LogicalBox::new(-2, 0, 4, 2), 1.0).unwrap();
        assert_eq!(canvas.pixel(0, 0), Some(0));
        assert_eq!(canvas.pixel(3, 1), Some(0xffff_ffff));
    }

    #[test]
    fn unsupported_buffer_format_fails_the_render() {
        let data = vec![0u8; 16];
        let mut src = source("yuv", LogicalBox::new(0, 0, 2, 2), OutputTransform::Normal, 2, 2, &data);
        src.buffer.format = ShmFormat(0x3231_564e);
        let err = render(&[src], LogicalBox::new(0, 0, 2, 2), 1.0).unwrap_err();
        assert!(matches!(err, WlgrabError::UnsupportedFormat { .. }));
    }

    proptest! {
        #[test]
        fn integer_layouts_at_unit_scale_are_grid_aligned(
            x in -4000i32..4000,
            y in -4000i32..4000,
            width in 1i32..4000,
            height in 1i32..4000,
            raw in 0u32..8,
        ) {
            let transform = OutputTransform::from_raw(raw).unwrap();
            let (bw, bh) = transform.apply_to_size(width as u32, height as u32);
            let logical = LogicalBox::new(x, y, width, height);
            let src = source("p", logical, transform, bw, bh, &[]);
            let forward = source_transform(&src, LogicalBox::new(-4000, -4000, 1, 1), 1.0);
            let r = compute_composite_region(&forward, bw, bh);
            prop_assert!(r.grid_aligned);
            prop_assert_eq!(r.dest, LogicalBox::new(x + 4000, y + 4000, width, height));
        }
    }

    #[test]
    fn canvas_size_tolerates_float_noise() {
        assert_eq!(canvas_size(LogicalBox::new(0, 0, 1920, 1080), 1.5), (2880, 1620));
        assert_eq!(canvas_size(LogicalBox::new(0, 0, 3, 3), 1.0 / 3.0), (1, 1));
        assert_eq!(canvas_size(LogicalBox::new(0, 0, 5, 5), 0.5), (3, 3));
        assert_eq!(canvas_size(LogicalBox::new(0, 0, 0, 5), 2.0), (0, 10));
    }
}
