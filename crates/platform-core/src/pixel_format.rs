//! Pixel format adapter.
//!
//! Sources announce buffers in `wl_shm` formats. Those are defined as
//! little-endian words, while the raster layouts used by the compositor are
//! defined on native-endian words (bit positions within a `u8`/`u16`/
//! 24-bit/`u32` value, most significant channel first). The mapping between
//! the two therefore depends on the host byte order: `ARGB8888` is
//! [`RasterFormat::A8r8g8b8`] on little-endian hosts and
//! [`RasterFormat::B8g8r8a8`] on big-endian hosts.
//!
//! Big-endian hosts only map the eight 32-bit formats.

use serde::{Deserialize, Serialize};

/// A `wl_shm` pixel format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShmFormat(pub u32);

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

impl ShmFormat {
    pub const ARGB8888: ShmFormat = ShmFormat(0);
    pub const XRGB8888: ShmFormat = ShmFormat(1);
    pub const RGB332: ShmFormat = ShmFormat(fourcc(b"RGB8"));
    pub const BGR233: ShmFormat = ShmFormat(fourcc(b"BGR8"));
    pub const XRGB4444: ShmFormat = ShmFormat(fourcc(b"XR12"));
    pub const XBGR4444: ShmFormat = ShmFormat(fourcc(b"XB12"));
    pub const ARGB4444: ShmFormat = ShmFormat(fourcc(b"AR12"));
    pub const ABGR4444: ShmFormat = ShmFormat(fourcc(b"AB12"));
    pub const XRGB1555: ShmFormat = ShmFormat(fourcc(b"XR15"));
    pub const XBGR1555: ShmFormat = ShmFormat(fourcc(b"XB15"));
    pub const ARGB1555: ShmFormat = ShmFormat(fourcc(b"AR15"));
    pub const ABGR1555: ShmFormat = ShmFormat(fourcc(b"AB15"));
    pub const RGB565: ShmFormat = ShmFormat(fourcc(b"RG16"));
    pub const BGR565: ShmFormat = ShmFormat(fourcc(b"BG16"));
    pub const RGB888: ShmFormat = ShmFormat(fourcc(b"RG24"));
    pub const BGR888: ShmFormat = ShmFormat(fourcc(b"BG24"));
    pub const XBGR8888: ShmFormat = ShmFormat(fourcc(b"XB24"));
    pub const RGBX8888: ShmFormat = ShmFormat(fourcc(b"RX24"));
    pub const BGRX8888: ShmFormat = ShmFormat(fourcc(b"BX24"));
    pub const ABGR8888: ShmFormat = ShmFormat(fourcc(b"AB24"));
    pub const RGBA8888: ShmFormat = ShmFormat(fourcc(b"RA24"));
    pub const BGRA8888: ShmFormat = ShmFormat(fourcc(b"BA24"));
    pub const XRGB2101010: ShmFormat = ShmFormat(fourcc(b"XR30"));
    pub const XBGR2101010: ShmFormat = ShmFormat(fourcc(b"XB30"));
    pub const ARGB2101010: ShmFormat = ShmFormat(fourcc(b"AR30"));
    pub const ABGR2101010: ShmFormat = ShmFormat(fourcc(b"AB30"));

    /// Canonical raster layout for this format on the current host, if any.
    #[cfg(target_endian = "little")]
    pub fn raster_format(self) -> Option<RasterFormat> {
        use RasterFormat::*;
        Some(match self {
            Self::RGB332 => R3g3b2,
            Self::BGR233 => B2g3r3,
            Self::ARGB4444 => A4r4g4b4,
            Self::XRGB4444 => X4r4g4b4,
            Self::ABGR4444 => A4b4g4r4,
            Self::XBGR4444 => X4b4g4r4,
            Self::ARGB1555 => A1r5g5b5,
            Self::XRGB1555 => X1r5g5b5,
            Self::ABGR1555 => A1b5g5r5,
            Self::XBGR1555 => X1b5g5r5,
            Self::RGB565 => R5g6b5,
            Self::BGR565 => B5g6r5,
            Self::RGB888 => R8g8b8,
            Self::BGR888 => B8g8r8,
            Self::ARGB8888 => A8r8g8b8,
            Self::XRGB8888 => X8r8g8b8,
            Self::ABGR8888 => A8b8g8r8,
            Self::XBGR8888 => X8b8g8r8,
            Self::BGRA8888 => B8g8r8a8,
            Self::BGRX8888 => B8g8r8x8,
            Self::RGBA8888 => R8g8b8a8,
            Self::RGBX8888 => R8g8b8x8,
            Self::ARGB2101010 => A2r10g10b10,
            Self::ABGR2101010 => A2b10g10r10,
            Self::XRGB2101010 => X2r10g10b10,
            Self::XBGR2101010 => X2b10g10r10,
            _ => return None,
        })
    }

    /// Canonical raster layout for this format on the current host, if any.
    #[cfg(target_endian = "big")]
    pub fn raster_format(self) -> Option<RasterFormat> {
        use RasterFormat::*;
        Some(match self {
            Self::ARGB8888 => B8g8r8a8,
            Self::XRGB8888 => B8g8r8x8,
            Self::ABGR8888 => R8g8b8a8,
            Self::XBGR8888 => R8g8b8x8,
            Self::BGRA8888 => A8r8g8b8,
            Self::BGRX8888 => X8r8g8b8,
            Self::RGBA8888 => A8b8g8r8,
            Self::RGBX8888 => X8b8g8r8,
            _ => return None,
        })
    }

    /// Whether buffers in this format can be composited.
    pub fn is_supported(self) -> bool {
        self.raster_format().is_some()
    }

    /// Smallest row stride for `width` pixels, rounded up to a 32-bit
    /// boundary. `None` for unsupported formats or overflowing widths.
    pub fn minimum_stride(self, width: u32) -> Option<u32> {
        let bpp = self.raster_format()?.bits_per_pixel() as u64;
        let stride = ((width as u64 * bpp + 0x1f) >> 5) * 4;
        u32::try_from(stride).ok()
    }
}

impl std::fmt::Display for ShmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::ARGB8888 => f.write_str("ARGB8888"),
            Self::XRGB8888 => f.write_str("XRGB8888"),
            ShmFormat(code) => {
                let bytes = code.to_le_bytes();
                if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
                    let name: String = bytes.iter().map(|b| *b as char).collect();
                    write!(f, "{} (0x{code:08x})", name.trim_end())
                } else {
                    write!(f, "0x{code:08x}")
                }
            }
        }
    }
}

/// One channel inside a native-endian pixel word. `bits == 0` means the
/// channel is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Channel {
    shift: u8,
    bits: u8,
}

const fn ch(shift: u8, bits: u8) -> Channel {
    Channel { shift, bits }
}

const NONE: Channel = ch(0, 0);

/// Canonical raster layouts, named most-significant channel first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterFormat {
    A8r8g8b8,
    X8r8g8b8,
    A8b8g8r8,
    X8b8g8r8,
    B8g8r8a8,
    B8g8r8x8,
    R8g8b8a8,
    R8g8b8x8,
    A2r10g10b10,
    X2r10g10b10,
    A2b10g10r10,
    X2b10g10r10,
    R8g8b8,
    B8g8r8,
    R5g6b5,
    B5g6r5,
    A1r5g5b5,
    X1r5g5b5,
    A1b5g5r5,
    X1b5g5r5,
    A4r4g4b4,
    X4r4g4b4,
    A4b4g4r4,
    X4b4g4r4,
    R3g3b2,
    B2g3r3,
}

/// `(bpp, a, r, g, b)`.
type Layout = (u8, Channel, Channel, Channel, Channel);

impl RasterFormat {
    fn layout(self) -> Layout {
        use RasterFormat::*;
        match self {
            A8r8g8b8 => (32, ch(24, 8), ch(16, 8), ch(8, 8), ch(0, 8)),
            X8r8g8b8 => (32, NONE, ch(16, 8), ch(8, 8), ch(0, 8)),
            A8b8g8r8 => (32, ch(24, 8), ch(0, 8), ch(8, 8), ch(16, 8)),
            X8b8g8r8 => (32, NONE, ch(0, 8), ch(8, 8), ch(16, 8)),
            B8g8r8a8 => (32, ch(0, 8), ch(8, 8), ch(16, 8), ch(24, 8)),
            B8g8r8x8 => (32, NONE, ch(8, 8), ch(16, 8), ch(24, 8)),
            R8g8b8a8 => (32, ch(0, 8), ch(24, 8), ch(16, 8), ch(8, 8)),
            R8g8b8x8 => (32, NONE, ch(24, 8), ch(16, 8), ch(8, 8)),
            A2r10g10b10 => (32, ch(30, 2), ch(20, 10), ch(10, 10), ch(0, 10)),
            X2r10g10b10 => (32, NONE, ch(20, 10), ch(10, 10), ch(0, 10)),
            A2b10g10r10 => (32, ch(30, 2), ch(0, 10), ch(10, 10), ch(20, 10)),
            X2b10g10r10 => (32, NONE, ch(0, 10), ch(10, 10), ch(20, 10)),
            R8g8b8 => (24, NONE, ch(16, 8), ch(8, 8), ch(0, 8)),
            B8g8r8 => (24, NONE, ch(0, 8), ch(8, 8), ch(16, 8)),
            R5g6b5 => (16, NONE, ch(11, 5), ch(5, 6), ch(0, 5)),
            B5g6r5 => (16, NONE, ch(0, 5), ch(5, 6), ch(11, 5)),
            A1r5g5b5 => (16, ch(15, 1), ch(10, 5), ch(5, 5), ch(0, 5)),
            X1r5g5b5 => (16, NONE, ch(10, 5), ch(5, 5), ch(0, 5)),
            A1b5g5r5 => (16, ch(15, 1), ch(0, 5), ch(5, 5), ch(10, 5)),
            X1b5g5r5 => (16, NONE, ch(0, 5), ch(5, 5), ch(10, 5)),
            A4r4g4b4 => (16, ch(12, 4), ch(8, 4), ch(4, 4), ch(0, 4)),
            X4r4g4b4 => (16, NONE, ch(8, 4), ch(4, 4), ch(0, 4)),
            A4b4g4r4 => (16, ch(12, 4), ch(0, 4), ch(4, 4), ch(8, 4)),
            X4b4g4r4 => (16, NONE, ch(0, 4), ch(4, 4), ch(8, 4)),
            R3g3b2 => (8, NONE, ch(5, 3), ch(2, 3), ch(0, 2)),
            B2g3r3 => (8, NONE, ch(0, 3), ch(3, 3), ch(6, 2)),
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        self.layout().0 as u32
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.layout().0 as usize / 8
    }

    pub fn has_alpha(self) -> bool {
        self.layout().1.bits != 0
    }

    /// Decode the pixel stored at the start of `bytes` into a premultiplied
    /// A8R8G8B8 word. Alpha-less formats decode as opaque.
    ///
    /// `bytes` must hold at least [`Self::bytes_per_pixel`] bytes.
    pub fn decode(self, bytes: &[u8]) -> u32 {
        let (bpp, a, r, g, b) = self.layout();
        let word = read_word(bytes, bpp);
        let alpha = if a.bits == 0 {
            0xff
        } else {
            extract(word, a)
        };
        (alpha as u32) << 24
            | (extract(word, r) as u32) << 16
            | (extract(word, g) as u32) << 8
            | extract(word, b) as u32
    }

    /// Encode a premultiplied A8R8G8B8 word into the stored layout at the
    /// start of `bytes`.
    pub fn encode(self, argb: u32, bytes: &mut [u8]) {
        let (bpp, a, r, g, b) = self.layout();
        let word = insert((argb >> 24) as u8, a)
            | insert((argb >> 16) as u8, r)
            | insert((argb >> 8) as u8, g)
            | insert(argb as u8, b);
        write_word(word, bytes, bpp);
    }
}

fn read_word(bytes: &[u8], bpp: u8) -> u32 {
    match bpp {
        32 => u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        24 => {
            if cfg!(target_endian = "little") {
                bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
            } else {
                (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
            }
        }
        16 => u16::from_ne_bytes([bytes[0], bytes[1]]) as u32,
        _ => bytes[0] as u32,
    }
}

fn write_word(word: u32, bytes: &mut [u8], bpp: u8) {
    match bpp {
        32 => bytes[..4].copy_from_slice(&word.to_ne_bytes()),
        24 => {
            let (b0, b1, b2) = ((word >> 16) as u8, (word >> 8) as u8, word as u8);
            if cfg!(target_endian = "little") {
                bytes[..3].copy_from_slice(&[b2, b1, b0]);
            } else {
                bytes[..3].copy_from_slice(&[b0, b1, b2]);
            }
        }
        16 => bytes[..2].copy_from_slice(&(word as u16).to_ne_bytes()),
        _ => bytes[0] = word as u8,
    }
}

/// Extract a channel and widen it to 8 bits by bit replication.
fn extract(word: u32, channel: Channel) -> u8 {
    if channel.bits == 0 {
        return 0;
    }
    let bits = channel.bits as u32;
    let value = (word >> channel.shift) & ((1u32 << bits) - 1);
    if bits >= 8 {
        return (value >> (bits - 8)) as u8;
    }
    let mut out = value << (8 - bits);
    let mut filled = bits;
    while filled < 8 {
        out |= out >> filled;
        filled *= 2;
    }
    (out & 0xff) as u8
}

/// Narrow (or replicate-widen) an 8-bit value into a channel.
fn insert(value: u8, channel: Channel) -> u32 {
    if channel.bits == 0 {
        return 0;
    }
    let bits = channel.bits as u32;
    let value = value as u32;
    let narrowed = if bits >= 8 {
        let extra = bits - 8;
        (value << extra) | (value >> (8 - extra).min(8)) & ((1u32 << extra) - 1)
    } else {
        value >> (8 - bits)
    };
    narrowed << channel.shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_FORMATS: [ShmFormat; 26] = [
        ShmFormat::ARGB8888,
        ShmFormat::XRGB8888,
        ShmFormat::RGB332,
        ShmFormat::BGR233,
        ShmFormat::XRGB4444,
        ShmFormat::XBGR4444,
        ShmFormat::ARGB4444,
        ShmFormat::ABGR4444,
        ShmFormat::XRGB1555,
        ShmFormat::XBGR1555,
        ShmFormat::ARGB1555,
        ShmFormat::ABGR1555,
        ShmFormat::RGB565,
        ShmFormat::BGR565,
        ShmFormat::RGB888,
        ShmFormat::BGR888,
        ShmFormat::XBGR8888,
        ShmFormat::RGBX8888,
        ShmFormat::BGRX8888,
        ShmFormat::ABGR8888,
        ShmFormat::RGBA8888,
        ShmFormat::BGRA8888,
        ShmFormat::XRGB2101010,
        ShmFormat::XBGR2101010,
        ShmFormat::ARGB2101010,
        ShmFormat::ABGR2101010,
    ];

    #[test]
    fn unsupported_formats_are_rejected_gracefully() {
        let nv12 = ShmFormat(fourcc(b"NV12"));
        assert!(!nv12.is_supported());
        assert_eq!(nv12.minimum_stride(1920), None);
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn every_listed_format_is_supported_on_little_endian() {
        for format in ALL_FORMATS {
            assert!(format.is_supported(), "{format} should be supported");
        }
    }

    #[test]
    fn stride_rounds_up_to_32_bits() {
        assert_eq!(ShmFormat::ARGB8888.minimum_stride(1920), Some(7680));
        #[cfg(target_endian = "little")]
        {
            assert_eq!(ShmFormat::RGB888.minimum_stride(3), Some(12));
            assert_eq!(ShmFormat::RGB565.minimum_stride(3), Some(8));
            assert_eq!(ShmFormat::RGB332.minimum_stride(5), Some(8));
        }
    }

    #[test]
    fn argb8888_matches_little_endian_storage() {
        // wl_shm formats are little-endian words: B, G, R, A in memory.
        let stored = [0x11, 0x22, 0x33, 0xff];
        let raster = ShmFormat::ARGB8888.raster_format().unwrap();
        assert_eq!(raster.decode(&stored), 0xff33_2211);

        let mut out = [0u8; 4];
        raster.encode(0xff33_2211, &mut out);
        assert_eq!(out, stored);
    }

    #[test]
    fn bgra8888_is_byte_reversed_argb() {
        let stored = [0xff, 0x33, 0x22, 0x11];
        let raster = ShmFormat::BGRA8888.raster_format().unwrap();
        assert_eq!(raster.decode(&stored), 0xff33_2211);
    }

    #[test]
    fn alpha_less_formats_decode_opaque() {
        let raster = ShmFormat::XRGB8888.raster_format().unwrap();
        assert_eq!(raster.decode(&[0x10, 0x20, 0x30, 0x00]) >> 24, 0xff);
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn narrow_channels_widen_by_replication() {
        let raster = ShmFormat::RGB565.raster_format().unwrap();
        // Pure red in 565 is 0xf800.
        assert_eq!(raster.decode(&0xf800u16.to_ne_bytes()), 0xffff_0000);

        let raster = ShmFormat::RGB888.raster_format().unwrap();
        assert_eq!(raster.decode(&[0x01, 0x02, 0x03]), 0xff03_0201);

        let raster = ShmFormat::XRGB2101010.raster_format().unwrap();
        let mut out = [0u8; 4];
        raster.encode(0xff80_4020, &mut out);
        assert_eq!(raster.decode(&out), 0xff80_4020);
    }

    #[test]
    fn display_names_fourcc_codes() {
        assert_eq!(ShmFormat::ARGB8888.to_string(), "ARGB8888");
        assert_eq!(ShmFormat::RGB565.to_string(), "RG16 (0x36314752)");
    }

    proptest! {
        #[test]
        fn stride_covers_the_image(index in 0usize..26, width in 0u32..10_000, height in 0u32..64) {
            let format = ALL_FORMATS[index];
            if let Some(raster) = format.raster_format() {
                let stride = format.minimum_stride(width).unwrap() as u64;
                let row_bytes = (width as u64 * raster.bits_per_pixel() as u64 + 7) / 8;
                prop_assert!(stride >= row_bytes);
                prop_assert_eq!(stride % 4, 0);
                prop_assert!(stride * height as u64 >= row_bytes * height as u64);
            }
        }

        #[test]
        fn eight_bit_formats_round_trip(index in 0usize..26, a in any::<u8>(), r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let format = ALL_FORMATS[index];
            if let Some(raster) = format.raster_format() {
                let (bpp, ..) = raster.layout();
                if bpp >= 24 && raster.layout().2.bits == 8 {
                    let argb = (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32;
                    let mut bytes = [0u8; 4];
                    raster.encode(argb, &mut bytes);
                    let decoded = raster.decode(&bytes);
                    prop_assert_eq!(decoded & 0x00ff_ffff, argb & 0x00ff_ffff);
                    if raster.has_alpha() {
                        prop_assert_eq!(decoded >> 24, argb >> 24);
                    }
                }
            }
        }
    }
}
