//! Pixel storage and sampling.
//!
//! All pixels handled here are premultiplied A8R8G8B8 words
//! (`0xAARRGGBB`).

use wlgrab_common::error::{WlgrabError, WlgrabResult};
use wlgrab_platform_core::ShmFormat;

/// Borrowed view of a captured shm buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    pub format: ShmFormat,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub data: &'a [u8],
}

/// A source buffer decoded to premultiplied ARGB.
#[derive(Debug, Clone)]
pub struct SourceImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl SourceImage {
    /// Decode a captured buffer. `name` identifies the source in errors.
    pub fn decode(view: &BufferView<'_>, name: &str) -> WlgrabResult<Self> {
        let raster = view.format.raster_format().ok_or_else(|| {
            WlgrabError::unsupported_format(name, format!("unsupported format {}", view.format))
        })?;
        let bpp = raster.bytes_per_pixel();
        let (width, height, stride) = (
            view.width as usize,
            view.height as usize,
            view.stride as usize,
        );
        let row_bytes = width * bpp;
        if stride < row_bytes {
            return Err(WlgrabError::render(format!(
                "{name}: stride {stride} is shorter than a {width} pixel row"
            )));
        }
        let needed = match height {
            0 => 0,
            h => stride * (h - 1) + row_bytes,
        };
        if view.data.len() < needed {
            return Err(WlgrabError::render(format!(
                "{name}: buffer holds {} bytes, {needed} needed",
                view.data.len()
            )));
        }

        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = &view.data[y * stride..y * stride + row_bytes];
            pixels.extend(row.chunks_exact(bpp).map(|px| raster.decode(px)));
        }
        Ok(Self {
            width: view.width,
            height: view.height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel at integer coordinates; transparent outside the image.
    pub fn texel(&self, x: i64, y: i64) -> u32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Bilinear sample at a continuous position (pixel `i` covers
    /// `[i, i + 1)`).
    pub fn sample_bilinear(&self, x: f64, y: f64) -> u32 {
        let (x0, wx) = split_sample(x - 0.5);
        let (y0, wy) = split_sample(y - 0.5);
        let mut acc = [0.0f64; 4];
        for (dy, fy) in [(0, 1.0 - wy), (1, wy)] {
            if fy == 0.0 {
                continue;
            }
            for (dx, fx) in [(0, 1.0 - wx), (1, wx)] {
                if fx == 0.0 {
                    continue;
                }
                accumulate(&mut acc, self.texel(x0 + dx, y0 + dy), fx * fy);
            }
        }
        pack(acc)
    }

    /// Separable Lanczos-2 convolution at a continuous position. The kernel
    /// is widened by `x_size`/`y_size` source pixels per destination pixel.
    /// Tap storage comes from `taps` so a whole draw shares one allocation.
    pub fn sample_convolution(
        &self,
        x: f64,
        y: f64,
        x_size: f64,
        y_size: f64,
        taps: &mut ConvolutionTaps,
    ) -> u32 {
        lanczos_taps(x, x_size, &mut taps.x);
        lanczos_taps(y, y_size, &mut taps.y);
        let mut acc = [0.0f64; 4];
        for &(ty, wy) in &taps.y {
            let mut row = [0.0f64; 4];
            for &(tx, wx) in &taps.x {
                accumulate(&mut row, self.texel(tx, ty), wx);
            }
            for (a, r) in acc.iter_mut().zip(row) {
                *a += r * wy;
            }
        }
        pack(acc)
    }
}

/// Reusable tap buffers for [`SourceImage::sample_convolution`].
#[derive(Debug, Default)]
pub struct ConvolutionTaps {
    x: Vec<(i64, f64)>,
    y: Vec<(i64, f64)>,
}

impl ConvolutionTaps {
    /// Buffers sized for kernels up to `x_size` by `y_size` source pixels.
    pub fn with_sizes(x_size: f64, y_size: f64) -> Self {
        let capacity = |size: f64| (4.0 * size).ceil() as usize + 1;
        Self {
            x: Vec::with_capacity(capacity(x_size)),
            y: Vec::with_capacity(capacity(y_size)),
        }
    }
}

/// Values this close to a texel boundary sample exactly one texel.
const SNAP: f64 = 1.0 / 65536.0;

fn split_sample(v: f64) -> (i64, f64) {
    let base = v.floor();
    let frac = v - base;
    if frac < SNAP {
        (base as i64, 0.0)
    } else if frac > 1.0 - SNAP {
        (base as i64 + 1, 0.0)
    } else {
        (base as i64, frac)
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

fn lanczos2(x: f64) -> f64 {
    if x.abs() >= 2.0 {
        0.0
    } else {
        sinc(x) * sinc(x / 2.0)
    }
}

/// Normalized tap positions and weights around `center`, written to `taps`.
fn lanczos_taps(center: f64, size: f64, taps: &mut Vec<(i64, f64)>) {
    taps.clear();
    let radius = 2.0 * size;
    let first = (center - radius - 0.5).ceil() as i64;
    let last = (center + radius - 0.5).floor() as i64;
    taps.extend(
        (first..=last)
            .map(|i| (i, lanczos2((i as f64 + 0.5 - center) / size)))
            .filter(|&(_, w)| w != 0.0),
    );
    let total: f64 = taps.iter().map(|&(_, w)| w).sum();
    if total.abs() > f64::EPSILON {
        for tap in taps.iter_mut() {
            tap.1 /= total;
        }
    }
}

fn accumulate(acc: &mut [f64; 4], argb: u32, weight: f64) {
    acc[0] += ((argb >> 24) & 0xff) as f64 * weight;
    acc[1] += ((argb >> 16) & 0xff) as f64 * weight;
    acc[2] += ((argb >> 8) & 0xff) as f64 * weight;
    acc[3] += (argb & 0xff) as f64 * weight;
}

/// Round accumulated channels back to a valid premultiplied pixel.
fn pack(acc: [f64; 4]) -> u32 {
    let alpha = acc[0].round().clamp(0.0, 255.0);
    let channel = |v: f64| v.round().clamp(0.0, alpha) as u32;
    (alpha as u32) << 24 | channel(acc[1]) << 16 | channel(acc[2]) << 8 | channel(acc[3])
}

/// `a * b / 255`, rounded.
fn mul_un8(a: u32, b: u32) -> u32 {
    let t = a * b + 0x80;
    ((t >> 8) + t) >> 8
}

/// Porter-Duff OVER of premultiplied pixels.
pub fn over(src: u32, dst: u32) -> u32 {
    let inv_alpha = 255 - (src >> 24);
    let mut out = 0;
    for shift in [24, 16, 8, 0] {
        let s = (src >> shift) & 0xff;
        let d = (dst >> shift) & 0xff;
        out |= (s + mul_un8(d, inv_alpha)).min(255) << shift;
    }
    out
}

/// The composited output image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Canvas {
    /// Transparent canvas.
    pub fn new(width: u32, height: u32) -> WlgrabResult<Self> {
        let too_large =
            || WlgrabError::allocation(format!("failed to create image with size: {width} x {height}"));
        let count = (width as usize)
            .checked_mul(height as usize)
            .filter(|count| count.checked_mul(4).map_or(false, |b| b <= isize::MAX as usize))
            .ok_or_else(too_large)?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(count).map_err(|_| too_large())?;
        pixels.resize(count, 0);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major premultiplied ARGB words.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub(crate) fn pixel_mut(&mut self, x: u32, y: u32) -> &mut u32 {
        let width = self.width as usize;
        &mut self.pixels[y as usize * width + x as usize]
    }

    /// Straight-alpha RGBA bytes.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &argb in &self.pixels {
            let a = argb >> 24;
            let unpremultiply = |c: u32| -> u8 {
                match a {
                    0 => 0,
                    255 => c as u8,
                    a => ((c * 255 + a / 2) / a).min(255) as u8,
                }
            };
            out.extend_from_slice(&[
                unpremultiply((argb >> 16) & 0xff),
                unpremultiply((argb >> 8) & 0xff),
                unpremultiply(argb & 0xff),
                a as u8,
            ]);
        }
        out
    }

    /// RGB bytes with alpha dropped; transparent areas come out black.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 3);
        for &argb in &self.pixels {
            out.extend_from_slice(&[(argb >> 16) as u8, (argb >> 8) as u8, argb as u8]);
        }
        out
    }
}
