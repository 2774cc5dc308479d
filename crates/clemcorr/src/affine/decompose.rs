//! QR-based decomposition of the 2×2 linear part.

use nalgebra::Matrix2;

use crate::error::{CorrError, Result};

/// Decomposition of an invertible linear part into
/// `M = R(φ) · diag(1, ±1) · diag(s1, s2) · [[1, h], [0, 1]]`.
///
/// `rotation` is φ in radians, `scale` the two positive principal-axis
/// factors, `parity` whether the map flips orientation (negative
/// determinant), and `shear` the off-diagonal factor `h`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decomposition {
    pub rotation: f64,
    pub scale: [f64; 2],
    pub parity: bool,
    pub shear: f64,
}

impl Decomposition {
    pub fn rotation_deg(&self) -> f64 {
        self.rotation.to_degrees()
    }

    /// Rebuild the linear part from the decomposed factors.
    pub fn to_matrix(&self) -> Matrix2<f64> {
        let (s, c) = self.rotation.sin_cos();
        let rot = Matrix2::new(c, -s, s, c);
        let par = Matrix2::new(1.0, 0.0, 0.0, if self.parity { -1.0 } else { 1.0 });
        let scale = Matrix2::new(self.scale[0], 0.0, 0.0, self.scale[1]);
        let shear = Matrix2::new(1.0, self.shear, 0.0, 1.0);
        rot * par * scale * shear
    }
}

const SINGULARITY_EPS: f64 = 1e-12;

/// Decompose `m` via QR with positive-diagonal normalization.
///
/// Fails on a (numerically) singular matrix; the factorization is unique
/// once both diagonal entries of R are made positive.
pub(crate) fn decompose(m: &Matrix2<f64>) -> Result<Decomposition> {
    if m.determinant().abs() < SINGULARITY_EPS {
        return Err(CorrError::SingularMatrix("decomposition of linear part"));
    }

    let (mut q, mut r) = m.qr().unpack();

    // Flip signs so both diagonal entries of R are positive; the sign moves
    // into the corresponding column of Q.
    for i in 0..2 {
        if r[(i, i)] < 0.0 {
            for j in 0..2 {
                r[(i, j)] = -r[(i, j)];
                q[(j, i)] = -q[(j, i)];
            }
        }
    }

    // Q is now either a rotation or a rotation times diag(1, -1); the angle
    // reads off the first column in both cases.
    let parity = q.determinant() < 0.0;
    let rotation = q[(1, 0)].atan2(q[(0, 0)]);

    let s1 = r[(0, 0)];
    let s2 = r[(1, 1)];
    Ok(Decomposition {
        rotation,
        scale: [s1, s2],
        parity,
        shear: r[(0, 1)] / s1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pure_scaling() {
        let d = decompose(&Matrix2::new(2.0, 0.0, 0.0, 2.0)).unwrap();
        assert_relative_eq!(d.rotation, 0.0);
        assert_relative_eq!(d.scale[0], 2.0);
        assert_relative_eq!(d.scale[1], 2.0);
        assert!(!d.parity);
        assert_relative_eq!(d.shear, 0.0);
    }

    #[test]
    fn rotation_angle_recovered() {
        let phi = 73f64.to_radians();
        let m = Matrix2::new(phi.cos(), -phi.sin(), phi.sin(), phi.cos()) * 1.7;
        let d = decompose(&m).unwrap();
        assert_relative_eq!(d.rotation, phi, epsilon = 1e-12);
        assert_relative_eq!(d.scale[0], 1.7, epsilon = 1e-12);
        assert_relative_eq!(d.scale[1], 1.7, epsilon = 1e-12);
        assert!(!d.parity);
    }

    #[test]
    fn parity_detected_for_reflection() {
        // flip the y axis
        let d = decompose(&Matrix2::new(1.0, 0.0, 0.0, -1.0)).unwrap();
        assert!(d.parity);
        assert_relative_eq!(d.scale[0], 1.0);
        assert_relative_eq!(d.scale[1], 1.0);
    }

    #[test]
    fn reconstruction_roundtrip() {
        let cases = [
            Matrix2::new(1.2, 0.3, -0.4, 0.9),
            Matrix2::new(-0.5, 2.0, 1.5, 0.25),
            Matrix2::new(0.0, -3.0, 2.0, 0.0),
            Matrix2::new(1.0, 0.0, 0.7, -1.3),
        ];
        for m in cases {
            let d = decompose(&m).unwrap();
            let back = d.to_matrix();
            assert_relative_eq!(m, back, epsilon = 1e-10);
            // parity must agree with the determinant sign
            assert_eq!(d.parity, m.determinant() < 0.0);
        }
    }

    #[test]
    fn singular_matrix_rejected() {
        let err = decompose(&Matrix2::new(1.0, 2.0, 0.5, 1.0)).unwrap_err();
        assert!(matches!(err, CorrError::SingularMatrix(_)));
    }
}
