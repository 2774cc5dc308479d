//! Staged establishment of the three-system correlation.
//!
//! Stage order: LM → overview fit, overview → search fit, composition and
//! inversion. Any stage failure aborts the whole run; a partially
//! established context is never observable.

use crate::affine::{fit, Affine2, RmsError};
use crate::error::Result;

use super::config::{CorrelationConfig, MarkerSpec, SearchMode, TransformKind};
use super::context::{CorrelationContext, MarkerResiduals};

/// Establish the correlation described by `config`.
pub fn establish(config: CorrelationConfig) -> Result<CorrelationContext> {
    let CorrelationConfig {
        mut markers,
        overview_detail,
        search_detail,
        mode,
        lm2overview_kind,
        overview2search_kind,
    } = config;

    // Mosaic correction is a pure coordinate translation, applied once
    // before any fit.
    if let SearchMode::MoveOverview {
        mosaic: Some(shift),
        ..
    } = &mode
    {
        let delta = shift.delta();
        tracing::debug!(dx = delta[0], dy = delta[1], "mosaic shift on overview markers");
        markers.shift_overview(delta);
    }

    let (lm2overview, lm2overview_residuals) = fit_lm2overview(&markers, lm2overview_kind)?;
    tracing::info!(
        rms = ?lm2overview.rms.value(),
        "lm→overview established"
    );

    let overview2search = fit_joint(&overview_detail, &search_detail, overview2search_kind)?;
    let overview2search_residuals =
        fit::residuals(&overview2search, &overview_detail, &search_detail)?;
    tracing::info!(
        rms = ?overview2search.rms.value(),
        "overview→search established"
    );

    let lm2search = lm2overview.then(&overview2search);

    let overview2lm = lm2overview.inverse()?;
    let search2overview = overview2search.inverse()?;
    let search2lm = lm2search.inverse()?;

    Ok(CorrelationContext {
        lm2overview,
        overview2lm,
        overview2search,
        search2overview,
        lm2search,
        search2lm,
        markers,
        overview_detail,
        search_detail,
        mode,
        lm2overview_residuals,
        overview2search_residuals,
    })
}

fn fit_joint(a: &[[f64; 2]], b: &[[f64; 2]], kind: TransformKind) -> Result<Affine2> {
    match kind {
        TransformKind::General => fit::fit_general(a, b),
        TransformKind::Similarity => fit::fit_similarity(a, b),
    }
}

fn fit_lm2overview(
    markers: &MarkerSpec,
    kind: TransformKind,
) -> Result<(Affine2, MarkerResiduals)> {
    match markers {
        MarkerSpec::Joint { lm, overview } => {
            let t = fit_joint(lm, overview, kind)?;
            let res = fit::residuals(&t, lm, overview)?;
            Ok((t, MarkerResiduals::Joint(res)))
        }
        MarkerSpec::Split {
            lm_gl,
            overview_gl,
            lm_d,
            overview_d,
        } => {
            let m = match kind {
                TransformKind::General => fit::fit_linear(lm_gl, overview_gl)?,
                TransformKind::Similarity => fit::fit_linear_similarity(lm_gl, overview_gl)?,
            };
            let d = fit::fit_translation(lm_d, overview_d, &m)?;

            let gl = fit::centered_residuals(&m, lm_gl, overview_gl)?;
            let mut t = Affine2::new(m, d);
            let d_res = fit::residuals(&t, lm_d, overview_d)?;
            // A single displacement pair interpolates exactly; only a larger
            // set yields a measured rms.
            t.rms = if lm_d.len() >= 2 {
                RmsError::Exact(fit::rms_of(&d_res))
            } else {
                RmsError::None
            };
            Ok((t, MarkerResiduals::Split { gl, d: d_res }))
        }
    }
}
