//! Serializable summary of an established correlation.
//!
//! The core exposes every fitted value; rendering (text tables, files) is
//! the caller's concern.

use serde::{Deserialize, Serialize};

use crate::affine::{Affine2, RmsError};
use crate::correlation::{CorrelationContext, MarkerResiduals};
use crate::error::Result;
use crate::spots::SpotProjection;

/// Decomposed parameters and fit quality of one transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSummary {
    pub rotation_deg: f64,
    pub scale: [f64; 2],
    pub parity: bool,
    pub shear: f64,
    pub translation: [f64; 2],
    pub rms: RmsError,
}

impl TransformSummary {
    pub fn from_transform(t: &Affine2) -> Result<Self> {
        let dec = t.decompose()?;
        Ok(Self {
            rotation_deg: dec.rotation_deg(),
            scale: dec.scale,
            parity: dec.parity,
            shear: dec.shear,
            translation: [t.d.x, t.d.y],
            rms: t.rms,
        })
    }
}

/// Everything the reporting layer needs about one correlation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub lm2overview: TransformSummary,
    pub overview2lm: TransformSummary,
    pub overview2search: TransformSummary,
    pub search2overview: TransformSummary,
    pub lm2search: TransformSummary,
    pub search2lm: TransformSummary,

    /// Per-marker residuals of the LM → overview fit, in overview units.
    pub marker_errors: MarkerResiduals,
    /// Per-detail residuals of the overview → search fit, in search units.
    pub detail_errors: Vec<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview_center: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_main: Option<[f64; 2]>,

    /// Projected spot sets, in LM/overview/search order.
    pub spots: Vec<SpotProjection>,
}

/// Assemble the report from an established context and projected spots.
pub fn build_report(
    ctx: &CorrelationContext,
    spots: Vec<SpotProjection>,
) -> Result<CorrelationReport> {
    Ok(CorrelationReport {
        lm2overview: TransformSummary::from_transform(&ctx.lm2overview)?,
        overview2lm: TransformSummary::from_transform(&ctx.overview2lm)?,
        overview2search: TransformSummary::from_transform(&ctx.overview2search)?,
        search2overview: TransformSummary::from_transform(&ctx.search2overview)?,
        lm2search: TransformSummary::from_transform(&ctx.lm2search)?,
        search2lm: TransformSummary::from_transform(&ctx.search2lm)?,
        marker_errors: ctx.lm2overview_residuals.clone(),
        detail_errors: ctx.overview2search_residuals.clone(),
        overview_center: ctx.overview_center(),
        search_main: ctx.search_main(),
        spots,
    })
}
