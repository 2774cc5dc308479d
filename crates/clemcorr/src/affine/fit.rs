//! Least-squares fitting of affine transforms from paired point sets.
//!
//! All fits minimize the total squared residual of `b ≈ M·a + d`. Point
//! sets are paired positionally: row i of `a` corresponds to row i of `b`.
//! The general fit normalizes both sets (centroid shift + isotropic scale)
//! before solving the normal equations, which keeps the 3×3 system well
//! conditioned for far-off-origin stage coordinates.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use super::{Affine2, RmsError};
use crate::error::{CorrError, Result};

/// Fit the full affine map (4 linear + 2 translation parameters).
///
/// Requires ≥3 pairs. Exactly 3 non-collinear pairs interpolate exactly and
/// leave the error unset; more pairs produce an exact RMS residual.
pub fn fit_general(a: &[[f64; 2]], b: &[[f64; 2]]) -> Result<Affine2> {
    check_pairs(a, b, 3)?;

    let (ca, sa, an) = normalize(a);
    let (cb, sb, bn) = normalize(b);

    // Normal equations for rows [x, y, 1] against each output axis.
    let mut ata = Matrix3::<f64>::zeros();
    let mut atu = Vector3::<f64>::zeros();
    let mut atv = Vector3::<f64>::zeros();
    for (p, q) in an.iter().zip(&bn) {
        let row = Vector3::new(p[0], p[1], 1.0);
        ata += row * row.transpose();
        atu += row * q[0];
        atv += row * q[1];
    }
    let inv = ata
        .try_inverse()
        .ok_or(CorrError::SingularMatrix("collinear points in general fit"))?;
    let tu = inv * atu;
    let tv = inv * atv;

    // Undo the normalization of both sides.
    let mn = Matrix2::new(tu[0], tu[1], tv[0], tv[1]);
    let dn = Vector2::new(tu[2], tv[2]);
    let m = mn * (sa / sb);
    let d = cb + dn / sb - m * ca;

    let rms = if a.len() == 3 {
        RmsError::None
    } else {
        RmsError::Exact(rms_of(&residuals_for(&m, &d, a, b)))
    };
    Ok(Affine2 { m, d, rms })
}

/// Fit a similarity-type transform: rotation, one isotropic scale, optional
/// parity, translation (4 parameters). Requires ≥2 pairs.
///
/// Both the direct and the reflected closed-form solutions are computed;
/// the one with the lower residual wins.
pub fn fit_similarity(a: &[[f64; 2]], b: &[[f64; 2]]) -> Result<Affine2> {
    check_pairs(a, b, 2)?;

    let ca = centroid(a);
    let cb = centroid(b);
    let m = similarity_linear(a, b, ca, cb)?;
    let d = cb - m * ca;

    let rms = if a.len() == 2 {
        RmsError::None
    } else {
        RmsError::Exact(rms_of(&residuals_for(&m, &d, a, b)))
    };
    Ok(Affine2 { m, d, rms })
}

/// Fit only the 2×2 linear part, both sets centered on their own centroids.
///
/// Used when the two marker sets outline the same shape but live in frames
/// with an unknown relative displacement.
pub fn fit_linear(a: &[[f64; 2]], b: &[[f64; 2]]) -> Result<Matrix2<f64>> {
    check_pairs(a, b, 3)?;
    let ca = centroid(a);
    let cb = centroid(b);

    // M = (Σ w·zᵀ)(Σ z·zᵀ)⁻¹ over centered pairs (z, w).
    let mut zz = Matrix2::<f64>::zeros();
    let mut wz = Matrix2::<f64>::zeros();
    for (p, q) in a.iter().zip(b) {
        let z = Vector2::new(p[0], p[1]) - ca;
        let w = Vector2::new(q[0], q[1]) - cb;
        zz += z * z.transpose();
        wz += w * z.transpose();
    }
    let inv = zz
        .try_inverse()
        .ok_or(CorrError::SingularMatrix("collinear points in linear fit"))?;
    Ok(wz * inv)
}

/// Similarity-restricted variant of [`fit_linear`]. Requires ≥2 pairs.
pub fn fit_linear_similarity(a: &[[f64; 2]], b: &[[f64; 2]]) -> Result<Matrix2<f64>> {
    check_pairs(a, b, 2)?;
    similarity_linear(a, b, centroid(a), centroid(b))
}

/// Fit only the translation given an already-fixed linear part:
/// `d = mean(b − M·a)`.
pub fn fit_translation(a: &[[f64; 2]], b: &[[f64; 2]], m: &Matrix2<f64>) -> Result<Vector2<f64>> {
    check_pairs(a, b, 1)?;
    let mut sum = Vector2::zeros();
    for (p, q) in a.iter().zip(b) {
        sum += Vector2::new(q[0], q[1]) - m * Vector2::new(p[0], p[1]);
    }
    Ok(sum / a.len() as f64)
}

/// Residuals `b − (M·a + d)` of a fitted transform over a paired set.
pub fn residuals(t: &Affine2, a: &[[f64; 2]], b: &[[f64; 2]]) -> Result<Vec<[f64; 2]>> {
    check_pairs(a, b, 0)?;
    Ok(residuals_for(&t.m, &t.d, a, b))
}

/// Residuals of a linear-only fit over centered pairs.
///
/// Both sets are centered on their own centroids before comparison, which
/// is the frame the split strategy's gl stage is fitted in.
pub fn centered_residuals(
    m: &Matrix2<f64>,
    a: &[[f64; 2]],
    b: &[[f64; 2]],
) -> Result<Vec<[f64; 2]>> {
    check_pairs(a, b, 1)?;
    let ca = centroid(a);
    let cb = centroid(b);
    Ok(a.iter()
        .zip(b)
        .map(|(p, q)| {
            let z = Vector2::new(p[0], p[1]) - ca;
            let w = Vector2::new(q[0], q[1]) - cb;
            let r = w - m * z;
            [r.x, r.y]
        })
        .collect())
}

/// Root-mean-square of residual vectors: `sqrt(mean(|r|²))`.
pub fn rms_of(res: &[[f64; 2]]) -> f64 {
    if res.is_empty() {
        return 0.0;
    }
    let sum: f64 = res.iter().map(|r| r[0] * r[0] + r[1] * r[1]).sum();
    (sum / res.len() as f64).sqrt()
}

// ── Internals ────────────────────────────────────────────────────────────

fn check_pairs(a: &[[f64; 2]], b: &[[f64; 2]], needed: usize) -> Result<()> {
    if a.len() != b.len() {
        return Err(CorrError::MismatchedLengths {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.len() < needed {
        return Err(CorrError::InsufficientPoints {
            needed,
            got: a.len(),
        });
    }
    Ok(())
}

fn centroid(pts: &[[f64; 2]]) -> Vector2<f64> {
    let n = pts.len() as f64;
    let sum = pts
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + Vector2::new(p[0], p[1]));
    sum / n
}

/// Centroid shift plus isotropic scale so the mean distance from the
/// centroid is √2. Returns (centroid, scale, normalized points).
fn normalize(pts: &[[f64; 2]]) -> (Vector2<f64>, f64, Vec<[f64; 2]>) {
    let c = centroid(pts);
    let mean_dist: f64 = pts
        .iter()
        .map(|p| ((p[0] - c.x).powi(2) + (p[1] - c.y).powi(2)).sqrt())
        .sum::<f64>()
        / pts.len() as f64;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let normalized = pts.iter().map(|p| [s * (p[0] - c.x), s * (p[1] - c.y)]).collect();
    (c, s, normalized)
}

/// Closed-form least-squares similarity on centered pairs.
///
/// Treating centered points as complex numbers, the direct solution fits
/// `w ≈ c·z` and the reflected one `w ≈ c·z̄`; each is a linear regression
/// with an explicit optimum.
fn similarity_linear(
    a: &[[f64; 2]],
    b: &[[f64; 2]],
    ca: Vector2<f64>,
    cb: Vector2<f64>,
) -> Result<Matrix2<f64>> {
    let mut zz = 0.0f64;
    let mut direct = [0.0f64; 2];
    let mut reflected = [0.0f64; 2];
    for (p, q) in a.iter().zip(b) {
        let (zx, zy) = (p[0] - ca.x, p[1] - ca.y);
        let (wx, wy) = (q[0] - cb.x, q[1] - cb.y);
        zz += zx * zx + zy * zy;
        // w·z̄ and w·z accumulated as (re, im)
        direct[0] += wx * zx + wy * zy;
        direct[1] += wy * zx - wx * zy;
        reflected[0] += wx * zx - wy * zy;
        reflected[1] += wx * zy + wy * zx;
    }
    if zz < 1e-15 {
        return Err(CorrError::SingularMatrix(
            "coincident points in similarity fit",
        ));
    }

    let m_direct = {
        let (p, q) = (direct[0] / zz, direct[1] / zz);
        Matrix2::new(p, -q, q, p)
    };
    let m_reflected = {
        let (p, q) = (reflected[0] / zz, reflected[1] / zz);
        Matrix2::new(p, q, q, -p)
    };

    let cost = |m: &Matrix2<f64>| -> f64 {
        a.iter()
            .zip(b)
            .map(|(p, q)| {
                let z = Vector2::new(p[0] - ca.x, p[1] - ca.y);
                let w = Vector2::new(q[0] - cb.x, q[1] - cb.y);
                (w - m * z).norm_squared()
            })
            .sum()
    };
    if cost(&m_direct) <= cost(&m_reflected) {
        Ok(m_direct)
    } else {
        Ok(m_reflected)
    }
}

fn residuals_for(
    m: &Matrix2<f64>,
    d: &Vector2<f64>,
    a: &[[f64; 2]],
    b: &[[f64; 2]],
) -> Vec<[f64; 2]> {
    a.iter()
        .zip(b)
        .map(|(p, q)| {
            let pred = m * Vector2::new(p[0], p[1]) + d;
            [q[0] - pred.x, q[1] - pred.y]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn apply_truth(m: &Matrix2<f64>, d: &Vector2<f64>, pts: &[[f64; 2]]) -> Vec<[f64; 2]> {
        Affine2::new(*m, *d).transform(pts)
    }

    #[test]
    fn three_point_doubling_fit() {
        let a = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let b = [[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]];
        let t = fit_general(&a, &b).unwrap();

        assert_relative_eq!(t.m, Matrix2::new(2.0, 0.0, 0.0, 2.0), epsilon = 1e-12);
        assert_relative_eq!(t.d, Vector2::zeros(), epsilon = 1e-12);
        // exact interpolation: no measured error
        assert_eq!(t.rms, RmsError::None);

        let dec = t.decompose().unwrap();
        assert_relative_eq!(dec.rotation, 0.0, epsilon = 1e-12);
        assert_relative_eq!(dec.scale[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(dec.scale[1], 2.0, epsilon = 1e-12);
        assert!(!dec.parity);
        assert_relative_eq!(dec.shear, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn exact_fit_reproduces_input_points() {
        let a = [[0.0, 0.0], [3.0, 1.0], [-2.0, 4.0]];
        let b = [[10.0, -3.0], [12.5, 2.0], [4.0, 6.0]];
        let t = fit_general(&a, &b).unwrap();
        for (p, q) in a.iter().zip(&b) {
            let got = t.apply(*p);
            assert_relative_eq!(got[0], q[0], epsilon = 1e-9);
            assert_relative_eq!(got[1], q[1], epsilon = 1e-9);
        }
    }

    #[test]
    fn overdetermined_fit_recovers_truth_and_rms() {
        let m = Matrix2::new(1.4, -0.3, 0.2, 0.9);
        let d = Vector2::new(120.0, -45.0);
        let mut rng = StdRng::seed_from_u64(7);

        let a: Vec<[f64; 2]> = (0..24)
            .map(|_| [rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)])
            .collect();
        let b: Vec<[f64; 2]> = apply_truth(&m, &d, &a)
            .into_iter()
            .map(|p| [p[0] + rng.gen_range(-0.1..0.1), p[1] + rng.gen_range(-0.1..0.1)])
            .collect();

        let t = fit_general(&a, &b).unwrap();
        assert_relative_eq!(t.m, m, epsilon = 1e-2);
        assert_relative_eq!(t.d, d, epsilon = 0.2);
        match t.rms {
            RmsError::Exact(e) => assert!(e > 0.0 && e < 0.2, "rms {}", e),
            other => panic!("expected exact rms, got {:?}", other),
        }
    }

    #[test]
    fn general_fit_rejects_two_pairs() {
        let a = [[0.0, 0.0], [1.0, 1.0]];
        let err = fit_general(&a, &a).unwrap_err();
        assert_eq!(err, CorrError::InsufficientPoints { needed: 3, got: 2 });
    }

    #[test]
    fn mismatched_sets_rejected() {
        let a = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let b = [[0.0, 0.0], [1.0, 0.0]];
        let err = fit_general(&a, &b).unwrap_err();
        assert_eq!(err, CorrError::MismatchedLengths { left: 3, right: 2 });
    }

    #[test]
    fn collinear_points_are_singular() {
        let a = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let b = [[0.0, 0.0], [2.0, 2.0], [4.0, 4.0]];
        assert!(matches!(
            fit_general(&a, &b),
            Err(CorrError::SingularMatrix(_))
        ));
    }

    #[test]
    fn similarity_recovers_rotation_and_scale() {
        let phi = 40f64.to_radians();
        let m = Matrix2::new(phi.cos(), -phi.sin(), phi.sin(), phi.cos()) * 2.5;
        let d = Vector2::new(-3.0, 8.0);
        let a = [[0.0, 0.0], [4.0, 0.0], [4.0, 3.0], [0.0, 3.0], [2.0, 1.5]];
        let b = apply_truth(&m, &d, &a);

        let t = fit_similarity(&a, &b).unwrap();
        assert_relative_eq!(t.m, m, epsilon = 1e-10);
        assert_relative_eq!(t.d, d, epsilon = 1e-9);

        let dec = t.decompose().unwrap();
        assert_relative_eq!(dec.rotation, phi, epsilon = 1e-10);
        assert_relative_eq!(dec.scale[0], 2.5, epsilon = 1e-10);
        assert!(!dec.parity);
    }

    #[test]
    fn similarity_picks_reflected_solution() {
        // truth flips the y axis, then rotates
        let phi = 15f64.to_radians();
        let m = Matrix2::new(phi.cos(), -phi.sin(), phi.sin(), phi.cos())
            * Matrix2::new(1.0, 0.0, 0.0, -1.0)
            * 1.2;
        let a = [[0.0, 0.0], [5.0, 0.0], [5.0, 2.0], [1.0, 4.0]];
        let b = apply_truth(&m, &Vector2::new(1.0, 1.0), &a);

        let t = fit_similarity(&a, &b).unwrap();
        assert_relative_eq!(t.m, m, epsilon = 1e-10);
        assert!(t.decompose().unwrap().parity);
    }

    #[test]
    fn similarity_two_pairs_is_exact() {
        let a = [[0.0, 0.0], [2.0, 0.0]];
        let b = [[1.0, 1.0], [1.0, 5.0]];
        let t = fit_similarity(&a, &b).unwrap();
        assert_eq!(t.rms, RmsError::None);
        for (p, q) in a.iter().zip(&b) {
            let got = t.apply(*p);
            assert_relative_eq!(got[0], q[0], epsilon = 1e-12);
            assert_relative_eq!(got[1], q[1], epsilon = 1e-12);
        }
    }

    #[test]
    fn similarity_rejects_single_pair() {
        let a = [[1.0, 1.0]];
        let err = fit_similarity(&a, &a).unwrap_err();
        assert_eq!(err, CorrError::InsufficientPoints { needed: 2, got: 1 });
    }

    #[test]
    fn split_linear_translation_recovers_truth() {
        let m = Matrix2::new(0.8, 0.4, -0.4, 0.8);
        let d = Vector2::new(55.0, -20.0);

        // gl markers outline the same shape but are displaced between frames
        let gl_a = [[0.0, 0.0], [10.0, 0.0], [10.0, 6.0], [0.0, 6.0]];
        let offset = Vector2::new(7.0, -3.0);
        let gl_b: Vec<[f64; 2]> = gl_a
            .iter()
            .map(|p| {
                let q = m * Vector2::new(p[0], p[1]) + d + offset;
                [q.x, q.y]
            })
            .collect();

        // displacement markers correspond exactly
        let d_a = [[3.0, 2.0], [5.0, 1.0]];
        let d_b = apply_truth(&m, &d, &d_a);

        let m_fit = fit_linear(&gl_a, &gl_b).unwrap();
        assert_relative_eq!(m_fit, m, epsilon = 1e-10);

        let d_fit = fit_translation(&d_a, &d_b, &m_fit).unwrap();
        assert_relative_eq!(d_fit, d, epsilon = 1e-9);
    }

    #[test]
    fn rms_of_residual_vectors() {
        let res = [[3.0, 4.0], [0.0, 0.0]];
        // mean squared norm (25 + 0)/2
        assert_relative_eq!(rms_of(&res), (12.5f64).sqrt());
        assert_eq!(rms_of(&[]), 0.0);
    }
}
