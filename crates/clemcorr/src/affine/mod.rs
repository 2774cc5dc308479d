//! 2D affine transforms between imaging coordinate systems.
//!
//! An [`Affine2`] maps points as `y = M·x + d` with a 2×2 linear part `M`
//! and a translation `d`. Fitting from paired point sets lives in [`fit`],
//! extraction of rotation/scale/parity/shear in [`decompose`].

mod decompose;
pub mod fit;

pub use decompose::Decomposition;
pub use fit::{fit_general, fit_linear, fit_linear_similarity, fit_similarity, fit_translation};

use nalgebra::{Matrix2, Vector2};

use crate::error::{CorrError, Result};

/// Fit quality carried by a transform.
///
/// `Exact` is a root-mean-square residual measured from an over-determined
/// fit. `Estimated` was propagated from another transform (via inversion or
/// composition) rather than measured. An exactly-determined fit carries
/// `None` until the pipeline fills in an estimate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RmsError {
    Exact(f64),
    Estimated(f64),
    None,
}

impl RmsError {
    /// The carried error value, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Exact(e) | Self::Estimated(e) => Some(*e),
            Self::None => None,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }

    /// Scale the carried value by `factor`, degrading `Exact` to `Estimated`.
    ///
    /// A propagated error is never exact again: it was not measured against
    /// the transform that carries it.
    pub(crate) fn propagate(&self, factor: f64) -> RmsError {
        match self {
            Self::Exact(e) | Self::Estimated(e) => Self::Estimated(e * factor),
            Self::None => Self::None,
        }
    }
}

/// A 2D affine transform `y = M·x + d` with attached fit quality.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine2 {
    /// Linear part.
    pub m: Matrix2<f64>,
    /// Translation.
    pub d: Vector2<f64>,
    /// RMS residual of the fit that produced this transform.
    pub rms: RmsError,
}

impl Affine2 {
    pub fn new(m: Matrix2<f64>, d: Vector2<f64>) -> Self {
        Self {
            m,
            d,
            rms: RmsError::None,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix2::identity(), Vector2::zeros())
    }

    /// Apply the transform to a single point.
    pub fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let q = self.m * Vector2::new(p[0], p[1]) + self.d;
        [q.x, q.y]
    }

    /// Apply the transform row-wise to a point set. No fitting side effects.
    pub fn transform(&self, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Composition with `other`, self applied first: `(other ∘ self)`.
    ///
    /// The composed linear part is `M_o·M_s` and the translation
    /// `M_o·d_s + d_o`. When both operands carry an error value the
    /// composition gets an estimate with the first stage's error converted
    /// into final-system units by `other`'s mean scale.
    pub fn then(&self, other: &Affine2) -> Affine2 {
        let rms = match (self.rms.value(), other.rms.value()) {
            (Some(es), Some(eo)) => {
                let s = other.m.determinant().abs().sqrt();
                RmsError::Estimated(((es * s).powi(2) + eo.powi(2)).sqrt())
            }
            _ => RmsError::None,
        };
        Affine2 {
            m: other.m * self.m,
            d: other.m * self.d + other.d,
            rms,
        }
    }

    /// Inverse transform `x = M⁻¹·(y − d)`.
    ///
    /// The forward error is carried over scaled by the square root of the
    /// product of the inverse's scale factors (`sqrt(|det M⁻¹|)`), and is
    /// always marked estimated.
    pub fn inverse(&self) -> Result<Affine2> {
        let m_inv = self
            .m
            .try_inverse()
            .ok_or(CorrError::SingularMatrix("inverse of linear part"))?;
        let factor = m_inv.determinant().abs().sqrt();
        Ok(Affine2 {
            m: m_inv,
            d: -(m_inv * self.d),
            rms: self.rms.propagate(factor),
        })
    }

    /// Decompose the linear part into rotation, scales, parity and shear.
    pub fn decompose(&self) -> Result<Decomposition> {
        decompose::decompose(&self.m)
    }
}
