//! Logical layout rectangles.
//!
//! Logical coordinates are the compositor's DPI-independent desktop space.
//! Every capture source occupies one [`LogicalBox`] in it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in logical desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LogicalBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Errors produced when parsing a `"x,y wxh"` geometry string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseBoxError {
    #[error("invalid geometry '{0}', expected \"<x>,<y> <width>x<height>\"")]
    Malformed(String),
}

impl LogicalBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A box with no area intersects nothing.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Whether the two boxes share a region of positive area.
    ///
    /// Boxes that merely touch along an edge do not intersect.
    pub fn intersects(&self, other: &LogicalBox) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        x2 > x1 && y2 > y1
    }

    /// The smallest box enclosing every box in `boxes`.
    ///
    /// Returns `None` when the iterator is empty.
    pub fn extents<'a>(boxes: impl IntoIterator<Item = &'a LogicalBox>) -> Option<LogicalBox> {
        let mut iter = boxes.into_iter();
        let first = iter.next()?;
        let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.right(), first.bottom());
        for b in iter {
            x1 = x1.min(b.x);
            y1 = y1.min(b.y);
            x2 = x2.max(b.right());
            y2 = y2.max(b.bottom());
        }
        Some(LogicalBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

impl std::fmt::Display for LogicalBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for LogicalBox {
    type Err = ParseBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseBoxError::Malformed(s.to_string());

        let mut parts = s.split_whitespace();
        let (position, size) = match (parts.next(), parts.next(), parts.next()) {
            (Some(position), Some(size), None) => (position, size),
            _ => return Err(malformed()),
        };

        let (x, y) = position.split_once(',').ok_or_else(malformed)?;
        let (w, h) = size.split_once('x').ok_or_else(malformed)?;

        let parse = |v: &str| v.trim().parse::<i32>().map_err(|_| malformed());
        Ok(LogicalBox::new(parse(x)?, parse(y)?, parse(w)?, parse(h)?))
    }
}
