//! clemcorr — coordinate correlation between light microscopy and EM systems.
//!
//! Establishes 2D affine correspondences between three imaging coordinate
//! systems (LM image, EM overview image, EM stage/search) from paired
//! marker observations, and projects target spots between all of them.
//! The stages are:
//!
//! 1. **LM → overview** – joint fit from corresponding markers, or a split
//!    fit (linear part from shape-only markers, translation from a second
//!    set).
//! 2. **Overview → search** – fit from detail markers, acquired in collage,
//!    move-search or move-overview mode (optionally mosaic-corrected).
//! 3. **Compose** – LM → search plus the three inverses, with error
//!    propagation.
//! 4. **Project** – map spot sets into the other two systems for reporting.
//!
//! # Public API
//! - [`correlation::establish`] with [`correlation::CorrelationConfig`]
//! - [`affine::Affine2`] fitting/decomposition primitives
//! - [`spots::project_spots`] and [`report::build_report`]
//!
//! Marker coordinates arrive through [`positions::PositionSource`]; file
//! formats are a collaborator's concern.

pub mod affine;
pub mod correlation;
pub mod error;
pub mod positions;
pub mod report;
pub mod spots;

pub use affine::{Affine2, Decomposition, RmsError};
pub use correlation::{
    establish, CorrelationConfig, CorrelationContext, MarkerResiduals, MarkerSpec, MosaicShift,
    SearchMode, TransformKind,
};
pub use error::{CorrError, Result};
pub use positions::{PositionSource, RowSelect, TableSource};
pub use report::{build_report, CorrelationReport, TransformSummary};
pub use spots::{project_spots, SpotProjection, SpotSet, SpotSystem};
