//! Pipeline configuration types.

use serde::{Deserialize, Serialize};

/// Transformation model for a single fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Full general-linear transformation (rotation, two scales, shear).
    General,
    /// Rotation + one isotropic scale + optional parity.
    Similarity,
}

/// Which marker sets drive the LM → overview fit.
///
/// The variant is resolved once, at configuration time; supplying both or
/// neither of the joint/split parameter families is a configuration error
/// at the layer that builds this value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSpec {
    /// Marker rows correspond one-to-one between the two systems.
    Joint {
        lm: Vec<[f64; 2]>,
        overview: Vec<[f64; 2]>,
    },
    /// Separate linear and translation estimation: the `gl` sets outline the
    /// same shape in the same orientation but with an unknown relative
    /// displacement; the `d` sets correspond exactly and fix the translation.
    Split {
        lm_gl: Vec<[f64; 2]>,
        overview_gl: Vec<[f64; 2]>,
        lm_d: Vec<[f64; 2]>,
        overview_d: Vec<[f64; 2]>,
    },
}

impl MarkerSpec {
    /// Shift all overview-side marker coordinates by `delta`.
    ///
    /// Applied once, before any fit, to reconcile markers measured on a
    /// mosaic image with the single-image overview frame.
    pub(crate) fn shift_overview(&mut self, delta: [f64; 2]) {
        let shift = |pts: &mut Vec<[f64; 2]>| {
            for p in pts.iter_mut() {
                p[0] += delta[0];
                p[1] += delta[1];
            }
        };
        match self {
            Self::Joint { overview, .. } => shift(overview),
            Self::Split {
                overview_gl,
                overview_d,
                ..
            } => {
                shift(overview_gl);
                shift(overview_d);
            }
        }
    }
}

/// Coordinates reconciling a mosaic overview with the single reference image.
///
/// One feature is marked on both images; the difference of the two
/// observations is the shift applied to all overview markers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MosaicShift {
    /// The feature's coordinates on the mosaic image.
    pub mosaic_main: [f64; 2],
    /// The same feature's coordinates on the single overview image.
    pub overview_main: [f64; 2],
}

impl MosaicShift {
    /// Shift that re-expresses mosaic-frame coordinates in the
    /// single-image frame.
    pub fn delta(&self) -> [f64; 2] {
        [
            self.overview_main[0] - self.mosaic_main[0],
            self.overview_main[1] - self.mosaic_main[1],
        ]
    }
}

/// How the search-side detail coordinates were acquired.
///
/// The fit math is the same for all three; move-overview carries two extra
/// positions that the reporting layer needs to interpret correlated stage
/// coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum SearchMode {
    /// Details measured directly on a fixed collage/mosaic overview image.
    Collage,
    /// The stage was moved so each detail sits in the image center; stage
    /// coordinates are the search details.
    MoveSearch,
    /// The overview frame was re-imaged at different stage positions.
    MoveOverview {
        /// Stage position of the main overview image.
        search_main: [f64; 2],
        /// Where a correlated spot lands on an image taken at the correlated
        /// stage position (typically the image center).
        overview_center: [f64; 2],
        /// Mosaic-to-single-image correction, when markers were picked on a
        /// mosaic.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mosaic: Option<MosaicShift>,
    },
}

/// Full input of a correlation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// LM ↔ overview markers.
    pub markers: MarkerSpec,
    /// Detail coordinates in the overview system.
    pub overview_detail: Vec<[f64; 2]>,
    /// Corresponding detail coordinates in the search (stage) system.
    pub search_detail: Vec<[f64; 2]>,
    /// Search acquisition mode.
    pub mode: SearchMode,
    /// Model for the LM → overview fit.
    pub lm2overview_kind: TransformKind,
    /// Model for the overview → search fit.
    pub overview2search_kind: TransformKind,
}
