//! Output transforms: the 8 combinations of 90° rotation and horizontal flip.

use serde::{Deserialize, Serialize};

/// Orientation of a source relative to its buffer, matching the
/// `wl_output.transform` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTransform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

const TRANSFORM_90: u32 = 1;
const TRANSFORM_FLIPPED: u32 = 4;

impl OutputTransform {
    /// Decode the protocol value. Unknown values yield `None`.
    pub fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Normal,
            1 => Self::Rotate90,
            2 => Self::Rotate180,
            3 => Self::Rotate270,
            4 => Self::Flipped,
            5 => Self::Flipped90,
            6 => Self::Flipped180,
            7 => Self::Flipped270,
            _ => return None,
        })
    }

    /// The protocol value.
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Whether the transform swaps width and height (90° and 270° classes).
    pub fn swaps_axes(self) -> bool {
        self.raw() & TRANSFORM_90 != 0
    }

    /// Whether the transform mirrors horizontally.
    pub fn is_flipped(self) -> bool {
        self.raw() & TRANSFORM_FLIPPED != 0
    }

    /// Apply the rotation class to a buffer size. The flip bit never
    /// changes the bounding size.
    pub fn apply_to_size<T>(self, width: T, height: T) -> (T, T) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Rotation angle in radians, ignoring the flip bit.
    pub fn rotation_radians(self) -> f64 {
        use std::f64::consts::PI;
        match self.raw() & !TRANSFORM_FLIPPED {
            1 => PI / 2.0,
            2 => PI,
            3 => 3.0 * PI / 2.0,
            _ => 0.0,
        }
    }

    /// `-1.0` for mirrored transforms, `1.0` otherwise.
    pub fn flip_sign(self) -> f64 {
        if self.is_flipped() {
            -1.0
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip() {
        for raw in 0..8 {
            assert_eq!(OutputTransform::from_raw(raw).unwrap().raw(), raw);
        }
        assert!(OutputTransform::from_raw(8).is_none());
    }

    #[test]
    fn only_quarter_turns_swap_axes() {
        assert_eq!(OutputTransform::Rotate90.apply_to_size(1920, 1080), (1080, 1920));
        assert_eq!(OutputTransform::Flipped270.apply_to_size(1920, 1080), (1080, 1920));
        assert_eq!(OutputTransform::Rotate180.apply_to_size(1920, 1080), (1920, 1080));
        assert_eq!(OutputTransform::Flipped.apply_to_size(1920, 1080), (1920, 1080));
    }

    #[test]
    fn flip_is_orthogonal_to_rotation() {
        assert_eq!(
            OutputTransform::Flipped90.rotation_radians(),
            OutputTransform::Rotate90.rotation_radians()
        );
        assert_eq!(OutputTransform::Flipped90.flip_sign(), -1.0);
        assert_eq!(OutputTransform::Rotate90.flip_sign(), 1.0);
    }
}
