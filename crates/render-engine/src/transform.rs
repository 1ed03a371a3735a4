//! 2D affine transforms.
//!
//! Transforms are built by successive left-multiplication: every
//! `then_*` call applies its operation *after* what was already there.

/// Row-major 2x3 affine matrix; the implicit third row is `[0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2D {
    pub m: [[f64; 3]; 2],
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    /// `other ∘ self`.
    pub fn then(self, other: Affine2D) -> Affine2D {
        let a = other.m;
        let b = self.m;
        Affine2D {
            m: [
                [
                    a[0][0] * b[0][0] + a[0][1] * b[1][0],
                    a[0][0] * b[0][1] + a[0][1] * b[1][1],
                    a[0][0] * b[0][2] + a[0][1] * b[1][2] + a[0][2],
                ],
                [
                    a[1][0] * b[0][0] + a[1][1] * b[1][0],
                    a[1][0] * b[0][1] + a[1][1] * b[1][1],
                    a[1][0] * b[0][2] + a[1][1] * b[1][2] + a[1][2],
                ],
            ],
        }
    }

    pub fn then_translate(self, tx: f64, ty: f64) -> Affine2D {
        self.then(Affine2D {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty]],
        })
    }

    pub fn then_scale(self, sx: f64, sy: f64) -> Affine2D {
        self.then(Affine2D {
            m: [[sx, 0.0, 0.0], [0.0, sy, 0.0]],
        })
    }

    /// Rotate by the angle whose cosine and sine are `c` and `s`.
    pub fn then_rotate(self, c: f64, s: f64) -> Affine2D {
        self.then(Affine2D {
            m: [[c, -s, 0.0], [s, c, 0.0]],
        })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.m;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// `None` for singular matrices.
    pub fn invert(&self) -> Option<Affine2D> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        Some(Affine2D {
            m: [
                [d * inv, -b * inv, (b * ty - d * tx) * inv],
                [-c * inv, a * inv, (c * tx - a * ty) * inv],
            ],
        })
    }

    /// Horizontal magnification: the larger of the first row's linear terms.
    pub fn x_scale(&self) -> f64 {
        self.m[0][0].abs().max(self.m[0][1].abs())
    }

    /// Vertical magnification: the larger of the second row's linear terms.
    pub fn y_scale(&self) -> f64 {
        self.m[1][0].abs().max(self.m[1][1].abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn operations_apply_in_call_order() {
        let t = Affine2D::IDENTITY
            .then_translate(1.0, 0.0)
            .then_scale(2.0, 3.0);
        assert!(close(t.apply(0.0, 1.0), (2.0, 3.0)));

        let t = Affine2D::IDENTITY
            .then_scale(2.0, 3.0)
            .then_translate(1.0, 0.0);
        assert!(close(t.apply(0.0, 1.0), (1.0, 3.0)));
    }

    #[test]
    fn quarter_turn_maps_x_axis_onto_y_axis() {
        let t = Affine2D::IDENTITY.then_rotate(0.0, 1.0);
        assert!(close(t.apply(1.0, 0.0), (0.0, 1.0)));
        assert!(close(t.apply(0.0, 1.0), (-1.0, 0.0)));
        assert_eq!(t.x_scale(), 1.0);
        assert_eq!(t.y_scale(), 1.0);
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = Affine2D::IDENTITY
            .then_translate(-960.0, -540.0)
            .then_scale(0.5, -0.5)
            .then_rotate(0.0, -1.0)
            .then_translate(100.0, 7.0);
        let inv = t.invert().unwrap();
        let p = t.apply(13.25, 900.5);
        assert!(close(inv.apply(p.0, p.1), (13.25, 900.5)));
        assert!(Affine2D::IDENTITY.then_scale(0.0, 1.0).invert().is_none());
    }
}
