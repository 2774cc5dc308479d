//! Established correlation state.

use crate::affine::Affine2;

use super::config::{MarkerSpec, SearchMode};

/// Per-marker residuals of the LM → overview fit, in overview units.
///
/// The split strategy keeps its two stages apart: `gl` residuals are taken
/// over centered pairs (displacement removed), `d` residuals over the full
/// transform.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerResiduals {
    Joint(Vec<[f64; 2]>),
    Split {
        gl: Vec<[f64; 2]>,
        d: Vec<[f64; 2]>,
    },
}

/// All transforms and point sets of an established correlation.
///
/// Built in one pass by [`super::establish`]; read-only afterwards. A
/// failed stage never produces a partial context.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub lm2overview: Affine2,
    pub overview2lm: Affine2,
    pub overview2search: Affine2,
    pub search2overview: Affine2,
    pub lm2search: Affine2,
    pub search2lm: Affine2,

    /// Markers as fitted (mosaic shift already applied, if any).
    pub markers: MarkerSpec,
    pub overview_detail: Vec<[f64; 2]>,
    pub search_detail: Vec<[f64; 2]>,
    pub mode: SearchMode,

    pub lm2overview_residuals: MarkerResiduals,
    /// Residuals of the overview → search fit, in search units.
    pub overview2search_residuals: Vec<[f64; 2]>,
}

impl CorrelationContext {
    /// Stage position of the main overview image (move-overview mode only).
    pub fn search_main(&self) -> Option<[f64; 2]> {
        match &self.mode {
            SearchMode::MoveOverview { search_main, .. } => Some(*search_main),
            _ => None,
        }
    }

    /// Correlated-spot position within an overview-magnification image
    /// (move-overview mode only).
    pub fn overview_center(&self) -> Option<[f64; 2]> {
        match &self.mode {
            SearchMode::MoveOverview {
                overview_center, ..
            } => Some(*overview_center),
            _ => None,
        }
    }
}
