//! Projection of target spots across the three systems.
//!
//! Spots are points of interest, not fitting input: projecting them reads
//! the established context and never mutates it. A set specified in one
//! system is mapped forward along the chain and through the corresponding
//! inverses for systems before it.

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationContext;
use crate::error::{CorrError, Result};

/// The system a spot set was specified in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotSystem {
    Lm,
    Overview,
    Search,
}

/// A set of target points in one system, with optional text labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotSet {
    pub points: Vec<[f64; 2]>,
    /// Either one label per point or absent entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl SpotSet {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self {
            points,
            labels: None,
        }
    }

    pub fn with_labels(points: Vec<[f64; 2]>, labels: Vec<String>) -> Self {
        Self {
            points,
            labels: Some(labels),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(labels) = &self.labels {
            if labels.len() != self.points.len() {
                return Err(CorrError::MismatchedLengths {
                    left: self.points.len(),
                    right: labels.len(),
                });
            }
        }
        Ok(())
    }
}

/// One spot set with its coordinates in all three systems.
///
/// The `system` column holds the original coordinates; the other two are
/// projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotProjection {
    pub system: SpotSystem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    pub lm: Vec<[f64; 2]>,
    pub overview: Vec<[f64; 2]>,
    pub search: Vec<[f64; 2]>,
}

/// Project up to three optional spot sets through an established context.
///
/// Output order is LM, overview, search; absent sets are skipped.
pub fn project_spots(
    ctx: &CorrelationContext,
    lm: Option<SpotSet>,
    overview: Option<SpotSet>,
    search: Option<SpotSet>,
) -> Result<Vec<SpotProjection>> {
    let mut out = Vec::new();

    if let Some(set) = lm {
        set.validate()?;
        out.push(SpotProjection {
            system: SpotSystem::Lm,
            overview: ctx.lm2overview.transform(&set.points),
            search: ctx.lm2search.transform(&set.points),
            lm: set.points,
            labels: set.labels,
        });
    }
    if let Some(set) = overview {
        set.validate()?;
        out.push(SpotProjection {
            system: SpotSystem::Overview,
            lm: ctx.overview2lm.transform(&set.points),
            search: ctx.overview2search.transform(&set.points),
            overview: set.points,
            labels: set.labels,
        });
    }
    if let Some(set) = search {
        set.validate()?;
        out.push(SpotProjection {
            system: SpotSystem::Search,
            lm: ctx.search2lm.transform(&set.points),
            overview: ctx.search2overview.transform(&set.points),
            search: set.points,
            labels: set.labels,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{
        establish, CorrelationConfig, MarkerSpec, SearchMode, TransformKind,
    };
    use approx::assert_relative_eq;

    fn context() -> CorrelationContext {
        // lm → overview: ×2; overview → search: +(-1, 1)
        let lm = vec![[0.0, 0.0], [4.0, 0.0], [0.0, 3.0]];
        let overview: Vec<[f64; 2]> = lm.iter().map(|p| [2.0 * p[0], 2.0 * p[1]]).collect();
        let overview_detail = vec![[0.0, 0.0], [6.0, 0.0], [0.0, 6.0]];
        let search_detail: Vec<[f64; 2]> = overview_detail
            .iter()
            .map(|p| [p[0] - 1.0, p[1] + 1.0])
            .collect();
        establish(CorrelationConfig {
            markers: MarkerSpec::Joint { lm, overview },
            overview_detail,
            search_detail,
            mode: SearchMode::MoveSearch,
            lm2overview_kind: TransformKind::General,
            overview2search_kind: TransformKind::General,
        })
        .unwrap()
    }

    #[test]
    fn lm_spots_project_forward() {
        let ctx = context();
        let out = project_spots(&ctx, Some(SpotSet::new(vec![[1.0, 2.0]])), None, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].system, SpotSystem::Lm);
        assert_relative_eq!(out[0].overview[0][0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(out[0].overview[0][1], 4.0, epsilon = 1e-10);
        assert_relative_eq!(out[0].search[0][0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(out[0].search[0][1], 5.0, epsilon = 1e-10);
    }

    #[test]
    fn search_spots_project_through_inverses() {
        let ctx = context();
        let labels = vec!["tomo 1".to_string()];
        let out = project_spots(
            &ctx,
            None,
            None,
            Some(SpotSet::with_labels(vec![[1.0, 5.0]], labels)),
        )
        .unwrap();
        assert_eq!(out[0].system, SpotSystem::Search);
        assert_relative_eq!(out[0].lm[0][0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(out[0].lm[0][1], 2.0, epsilon = 1e-10);
        assert_relative_eq!(out[0].overview[0][0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(out[0].overview[0][1], 4.0, epsilon = 1e-10);
        assert_eq!(out[0].labels.as_deref(), Some(&["tomo 1".to_string()][..]));
    }

    #[test]
    fn label_length_mismatch_rejected() {
        let ctx = context();
        let bad = SpotSet::with_labels(vec![[0.0, 0.0], [1.0, 1.0]], vec!["only one".into()]);
        let err = project_spots(&ctx, Some(bad), None, None).unwrap_err();
        assert_eq!(err, CorrError::MismatchedLengths { left: 2, right: 1 });
    }

    #[test]
    fn absent_sets_are_skipped() {
        let ctx = context();
        assert!(project_spots(&ctx, None, None, None).unwrap().is_empty());
    }
}
