use crate::Corners;
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Smallest pivot magnitude accepted during elimination (on normalized coordinates).
pub const PIVOT_EPSILON: f64 = 1e-10;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    /// Caller bug: the solver needs exactly four pairs.
    #[error("expected exactly 4 point correspondences (got src={src}, dst={dst})")]
    InvalidCorrespondences { src: usize, dst: usize },
    #[error("correspondences contain non-finite coordinates")]
    NonFinite,
    /// Colinear or coincident points; alignment is unavailable.
    #[error("degenerate correspondences (pivot {pivot:.3e} in column {column})")]
    Degenerate { column: usize, pivot: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Solve `dst ~ H * src` from two corner sets (TL, TR, BR, BL pairing).
    pub fn from_corners(src: &Corners, dst: &Corners) -> Result<Self, HomographyError> {
        solve_homography(&src.to_array(), &dst.to_array())
    }

    /// Projective map: `x' = (h00 x + h01 y + h02) / (h20 x + h21 y + h22)`, same for `y'`.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Max absolute element-wise difference from the identity matrix.
    pub fn distance_from_identity(&self) -> f64 {
        (self.h - Matrix3::identity()).abs().max()
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points4(pts: &[Point2<f32>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = 4.0_f64;
    let mut cx = 0.0_f64;
    let mut cy = 0.0_f64;
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0_f64;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let t = hartley_normalization(cx, cy, mean_dist);

    let mut out = [Point2::new(0.0_f64, 0.0_f64); 4];
    for (i, p) in pts.iter().enumerate() {
        let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
        out[i] = Point2::new(v[0], v[1]);
    }

    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Solve `A x = b` in place by Gaussian elimination with partial pivoting.
///
/// Fails instead of dividing when the best available pivot is below
/// [`PIVOT_EPSILON`].
fn gaussian_eliminate(
    mut a: SMatrix<f64, 8, 8>,
    mut b: SVector<f64, 8>,
) -> Result<SVector<f64, 8>, HomographyError> {
    const N: usize = 8;

    for col in 0..N {
        let mut pivot_row = col;
        let mut pivot_abs = a[(col, col)].abs();
        for r in (col + 1)..N {
            let v = a[(r, col)].abs();
            if v > pivot_abs {
                pivot_abs = v;
                pivot_row = r;
            }
        }
        if !(pivot_abs >= PIVOT_EPSILON) {
            return Err(HomographyError::Degenerate {
                column: col,
                pivot: pivot_abs,
            });
        }
        if pivot_row != col {
            a.swap_rows(col, pivot_row);
            b.swap_rows(col, pivot_row);
        }

        let pivot = a[(col, col)];
        for r in (col + 1)..N {
            let factor = a[(r, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..N {
                a[(r, c)] -= factor * a[(col, c)];
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = SVector::<f64, 8>::zeros();
    for row in (0..N).rev() {
        let mut acc = b[row];
        for c in (row + 1)..N {
            acc -= a[(row, c)] * x[c];
        }
        x[row] = acc / a[(row, row)];
    }
    Ok(x)
}

/// Compute H such that `dst ~ H * src` (projective) from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. To inverse-sample a
/// template rectangle from a scanned page, pass `src = ideal`, `dst = detected`
/// (the result maps template coordinates to page coordinates).
pub fn solve_homography(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
) -> Result<Homography, HomographyError> {
    let invalid = HomographyError::InvalidCorrespondences {
        src: src.len(),
        dst: dst.len(),
    };
    let src: &[Point2<f32>; 4] = src.try_into().map_err(|_| invalid.clone())?;
    let dst: &[Point2<f32>; 4] = dst.try_into().map_err(|_| invalid)?;
    if src
        .iter()
        .chain(dst.iter())
        .any(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        return Err(HomographyError::NonFinite);
    }

    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points4(src);
    let (dst_n, t_dst) = normalize_points4(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = gaussian_eliminate(a, b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let degenerate = HomographyError::Degenerate {
        column: 8,
        pivot: 0.0,
    };
    let h_den = denormalize_homography(hn, t_src, t_dst).ok_or(degenerate.clone())?;
    let h_den = normalize_homography(h_den).ok_or(degenerate)?;

    Ok(Homography::new(h_den))
}
