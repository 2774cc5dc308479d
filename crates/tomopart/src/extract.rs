//! Particle extraction from segmented tomograms.
//!
//! For each object id of a dataset: place a box around the label's center
//! of mass, slice the grey volume, normalize intensities, cast, write, and
//! append a catalog row. One dataset's volumes are opened, fully
//! processed and released before the next.

use std::path::PathBuf;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::boxes;
use crate::catalog::{CatalogRow, ParticleCatalog};
use crate::error::{ExtractError, Result};
use crate::volume::{SampleType, VolumeReader, VolumeSource, VolumeWriter};

/// Label-particle output settings.
///
/// The label box is remapped to `fg_value` where the voxel carries the
/// object's id and `bkg_value` elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelOptions {
    pub fg_value: f32,
    pub bkg_value: f32,
    pub dtype: SampleType,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            fg_value: 1.0,
            bkg_value: 0.0,
            dtype: SampleType::I16,
        }
    }
}

fn default_keep_ids() -> bool {
    true
}

/// Extraction settings for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Cubic box edge length in voxels.
    pub box_size: usize,
    /// Directory particles are written to (created if absent).
    pub particle_dir: PathBuf,
    /// Normalize particle means to this value before saving.
    #[serde(default)]
    pub mean: Option<f32>,
    /// Normalize particle standard deviations to this value before saving.
    #[serde(default)]
    pub std: Option<f32>,
    /// Output sample type; out-of-range values are clipped with a warning.
    /// `None` writes f32 unchanged.
    #[serde(default)]
    pub dtype: Option<SampleType>,
    /// Name files by original object id; otherwise by zero-based rank.
    #[serde(default = "default_keep_ids")]
    pub keep_ids: bool,
    /// Also extract label particles.
    #[serde(default)]
    pub labels: Option<LabelOptions>,
}

/// One dataset to extract from.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub group: String,
    pub identifier: String,
    pub tomo_path: PathBuf,
    /// Object ids to extract; `None` extracts every positive label.
    pub ids: Option<Vec<i32>>,
}

/// Outcome of one extracted object.
#[derive(Debug, Clone, Serialize)]
pub struct ParticleRecord {
    pub identifier: String,
    pub group: String,
    pub id: i32,
    pub particle_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_path: Option<PathBuf>,
    pub left: [usize; 3],
    pub center: [usize; 3],
    /// Whether the dtype cast had to clip out-of-range intensities.
    pub clipped: bool,
}

/// Per-dataset outcome: successful records plus per-object failures.
///
/// A failed object aborts only its own extraction; whether failures abort
/// the remaining batch is the caller's policy, not decided here.
#[derive(Debug, Default)]
pub struct DatasetOutcome {
    pub records: Vec<ParticleRecord>,
    pub failures: Vec<(i32, ExtractError)>,
}

/// Extracts particles and accumulates the catalog across datasets.
pub struct Extractor {
    opts: ExtractOptions,
    catalog: ParticleCatalog,
}

impl Extractor {
    pub fn new(opts: ExtractOptions) -> Self {
        Self {
            opts,
            catalog: ParticleCatalog::new(),
        }
    }

    pub fn catalog(&self) -> &ParticleCatalog {
        &self.catalog
    }

    pub fn into_catalog(self) -> ParticleCatalog {
        self.catalog
    }

    /// Extract all requested objects of one dataset.
    ///
    /// Dataset-level problems (oversized box, unreadable label volume,
    /// missing label ids) fail the call; per-object problems land in the
    /// outcome's `failures`.
    pub fn extract_dataset(
        &mut self,
        dataset: &Dataset,
        tomo: &dyn VolumeReader,
        labels: &dyn VolumeReader,
        writer: &dyn VolumeWriter,
    ) -> Result<DatasetOutcome> {
        let shape = tomo.shape();
        if labels.shape() != shape {
            return Err(ExtractError::Configuration(format!(
                "label volume shape {:?} does not match tomogram shape {:?}",
                labels.shape(),
                shape
            )));
        }
        if shape.iter().any(|&s| s < self.opts.box_size) {
            return Err(ExtractError::BoxTooLarge {
                box_size: self.opts.box_size,
                shape,
            });
        }

        let label_data = labels.read_all()?.mapv(|v| v as i32);
        let ids = match &dataset.ids {
            Some(ids) => ids.clone(),
            None => boxes::present_ids(&label_data.view()),
        };
        let mut outcome = DatasetOutcome::default();
        if ids.is_empty() {
            return Ok(outcome);
        }

        let centroids = boxes::label_centroids(&label_data.view(), &ids)?;
        std::fs::create_dir_all(&self.opts.particle_dir)?;
        let width = name_width(&ids, self.opts.keep_ids);

        tracing::info!(
            identifier = dataset.identifier.as_str(),
            n_objects = ids.len(),
            "extracting particles"
        );
        for (rank, &(id, center)) in centroids.iter().enumerate() {
            let file_id = if self.opts.keep_ids { id } else { rank as i32 };
            match self.extract_one(dataset, tomo, &label_data, id, file_id, width, center, writer) {
                Ok(record) => {
                    self.catalog.push(CatalogRow {
                        identifier: dataset.identifier.clone(),
                        group_name: dataset.group.clone(),
                        id,
                        tomo_path: dataset.tomo_path.clone(),
                        particle_path: record.particle_path.clone(),
                        left_corner_x: record.left[0],
                        left_corner_y: record.left[1],
                        left_corner_z: record.left[2],
                    });
                    outcome.records.push(record);
                }
                Err(e) => {
                    tracing::warn!(
                        identifier = dataset.identifier.as_str(),
                        id,
                        error = %e,
                        "object extraction failed"
                    );
                    outcome.failures.push((id, e));
                }
            }
        }
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_one(
        &self,
        dataset: &Dataset,
        tomo: &dyn VolumeReader,
        label_data: &Array3<i32>,
        id: i32,
        file_id: i32,
        width: usize,
        center: [i64; 3],
        writer: &dyn VolumeWriter,
    ) -> Result<ParticleRecord> {
        let bbox = boxes::resolve(center, self.opts.box_size, tomo.shape())?;
        let size = [bbox.size; 3];
        let mut data = tomo.read_box(bbox.left, size)?;

        // std first, then mean: the shift does not change the spread, so
        // both targets hold afterwards
        if let Some(target) = self.opts.std {
            let sd = population_std(&data);
            if sd == 0.0 {
                return Err(ExtractError::ZeroVariance {
                    identifier: dataset.identifier.clone(),
                    id,
                });
            }
            data.mapv_inplace(|v| v * target / sd);
        }
        if let Some(target) = self.opts.mean {
            let mu = data.mean().unwrap_or(0.0);
            data.mapv_inplace(|v| v - mu + target);
        }

        let particle_path = self.opts.particle_dir.join(format!(
            "{}_id-{:0width$}.mrc",
            dataset.identifier,
            file_id,
            width = width
        ));
        let mut clipped = false;
        if let Some(dtype) = self.opts.dtype {
            clipped = clip_cast(&mut data, dtype);
            if clipped {
                tracing::warn!(
                    particle = %particle_path.display(),
                    dtype = ?dtype,
                    "particle intensities clipped to fit output type"
                );
            }
        }
        writer.write(
            &particle_path,
            &data,
            self.opts.dtype.unwrap_or(SampleType::F32),
            tomo.header(),
        )?;

        let label_path = match &self.opts.labels {
            Some(label_opts) => {
                let view = label_data.slice(ndarray::s![
                    bbox.left[0]..bbox.left[0] + bbox.size,
                    bbox.left[1]..bbox.left[1] + bbox.size,
                    bbox.left[2]..bbox.left[2] + bbox.size
                ]);
                let remapped = view.mapv(|v| {
                    if v == id {
                        label_opts.fg_value
                    } else {
                        label_opts.bkg_value
                    }
                });
                let path = self.opts.particle_dir.join(format!(
                    "{}_id-{:0width$}_label.mrc",
                    dataset.identifier,
                    file_id,
                    width = width
                ));
                writer.write(&path, &remapped, label_opts.dtype, tomo.header())?;
                Some(path)
            }
            None => None,
        };

        Ok(ParticleRecord {
            identifier: dataset.identifier.clone(),
            group: dataset.group.clone(),
            id,
            particle_path,
            label_path,
            left: bbox.left,
            center: bbox.center,
            clipped,
        })
    }
}

/// Digit count of output file numbers: wide enough for the largest id
/// (or the batch count in rank mode), so names sort lexically.
fn name_width(ids: &[i32], keep_ids: bool) -> usize {
    let n = if keep_ids {
        ids.iter().copied().max().unwrap_or(1).max(1) as u64
    } else {
        ids.len().max(1) as u64
    };
    (n as f64).log10().floor() as usize + 1
}

fn population_std(data: &Array3<f32>) -> f32 {
    let n = data.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean: f64 = data.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var: f64 = data.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() as f32
}

/// Clip to the type's bounds and truncate toward zero (the cast the data
/// undergoes on write). Returns whether any value was clipped.
fn clip_cast(data: &mut Array3<f32>, dtype: SampleType) -> bool {
    let (lo, hi) = dtype.bounds();
    let mut clipped = false;
    data.mapv_inplace(|v| {
        if v < lo {
            clipped = true;
            lo
        } else if v > hi {
            clipped = true;
            hi
        } else if dtype.is_integer() {
            v.trunc()
        } else {
            v
        }
    });
    clipped
}

// ── Batch driver ─────────────────────────────────────────────────────────

/// Which identifiers belong to which experiment group, and which object
/// ids to extract for each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub datasets: Vec<DatasetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub identifier: String,
    #[serde(default)]
    pub ids: Option<Vec<i32>>,
}

/// Resolves dataset identifiers to volume paths.
///
/// Injected so the extraction core stays decoupled from any particular
/// file-layout convention.
pub trait TomoLocator {
    fn tomo_path(&self, group: &str, identifier: &str) -> Result<PathBuf>;
    fn labels_path(&self, group: &str, identifier: &str) -> Result<PathBuf>;
}

/// Simple locator over explicit per-identifier paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathTable {
    /// identifier → (tomogram path, label volume path)
    pub paths: std::collections::BTreeMap<String, (PathBuf, PathBuf)>,
}

impl TomoLocator for PathTable {
    fn tomo_path(&self, _group: &str, identifier: &str) -> Result<PathBuf> {
        self.paths
            .get(identifier)
            .map(|(t, _)| t.clone())
            .ok_or_else(|| missing_paths(identifier))
    }

    fn labels_path(&self, _group: &str, identifier: &str) -> Result<PathBuf> {
        self.paths
            .get(identifier)
            .map(|(_, l)| l.clone())
            .ok_or_else(|| missing_paths(identifier))
    }
}

fn missing_paths(identifier: &str) -> ExtractError {
    ExtractError::Configuration(format!("no volume paths for identifier {}", identifier))
}

/// Extract every requested identifier, in order.
///
/// Each identifier must belong to exactly one of the known groups (the
/// first group listing it wins). One dataset's volumes are opened,
/// processed and dropped before the next is touched.
pub fn extract_all(
    extractor: &mut Extractor,
    groups: &[GroupSpec],
    identifiers: &[String],
    locator: &dyn TomoLocator,
    source: &dyn VolumeSource,
    writer: &dyn VolumeWriter,
) -> Result<Vec<DatasetOutcome>> {
    let mut outcomes = Vec::with_capacity(identifiers.len());
    for identifier in identifiers {
        let found = groups.iter().find_map(|g| {
            g.datasets
                .iter()
                .find(|d| &d.identifier == identifier)
                .map(|d| (g, d))
        });
        let (group, spec) = found.ok_or_else(|| {
            let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
            ExtractError::Configuration(format!(
                "identifier {} does not belong to any of the groups {:?}",
                identifier, names
            ))
        })?;

        let tomo_path = locator.tomo_path(&group.name, identifier)?;
        let labels_path = locator.labels_path(&group.name, identifier)?;
        let tomo = source.open(&tomo_path)?;
        let labels = source.open(&labels_path)?;
        let dataset = Dataset {
            group: group.name.clone(),
            identifier: identifier.clone(),
            tomo_path,
            ids: spec.ids.clone(),
        };
        outcomes.push(extractor.extract_dataset(&dataset, tomo.as_ref(), labels.as_ref(), writer)?);
        // tomo and labels drop here, releasing their mappings before the
        // next dataset is opened
    }
    Ok(outcomes)
}
