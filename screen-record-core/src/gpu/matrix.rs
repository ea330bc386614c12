use serde::{Deserialize, Serialize};

/// A 4x4 transform stored row-major, applied to column vectors.
///
/// Used for texture coordinates: `(s, t, 0, 1)` in the destination quad maps
/// to `m * (s, t, 0, 1)` in the source texture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix(pub [f32; 16]);

impl TransformMatrix {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Mirrors the `t` axis: `t' = 1 - t`.
    pub const FLIP_VERTICAL: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, 1.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub fn scale_translate(sx: f32, sy: f32, tx: f32, ty: f32) -> Self {
        Self([
            sx, 0.0, 0.0, tx, //
            0.0, sy, 0.0, ty, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.0[row * 4 + col]
    }

    /// `self * rhs`: applying the result applies `rhs` first.
    pub fn multiply(&self, rhs: &Self) -> Self {
        let mut out = [0.0f32; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[row * 4 + col] = (0..4).map(|k| self.get(row, k) * rhs.get(k, col)).sum();
            }
        }
        Self(out)
    }

    /// Transforms the point `(x, y, 0, 1)`, returning `(x', y')` after the
    /// perspective divide.
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let tx = self.get(0, 0) * x + self.get(0, 1) * y + self.get(0, 3);
        let ty = self.get(1, 0) * x + self.get(1, 1) * y + self.get(1, 3);
        let w = self.get(3, 0) * x + self.get(3, 1) * y + self.get(3, 3);
        if w != 0.0 && w != 1.0 {
            (tx / w, ty / w)
        } else {
            (tx, ty)
        }
    }

    /// True when the transform only scales and translates each axis.
    pub fn is_axis_aligned(&self) -> bool {
        self.get(0, 1) == 0.0
            && self.get(1, 0) == 0.0
            && self.get(3, 0) == 0.0
            && self.get(3, 1) == 0.0
            && self.get(3, 3) == 1.0
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}
