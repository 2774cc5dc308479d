//! tomopart — particle extraction from segmented tomograms.
//!
//! Given a label volume (segmentation) and the tomogram it was derived
//! from, cuts a fixed-size sub-volume around each object's center of mass,
//! normalizes its intensity statistics, casts to an output sample type and
//! writes one particle file per object, accumulating a catalog of
//! (dataset, object) rows. The stages are:
//!
//! 1. **Boxes** – per-label centers of mass, boundary-clamped box placement.
//! 2. **Extract** – slice, normalize, cast (clipping warns but never
//!    aborts), name deterministically, append to the catalog.
//! 3. **Batch** – walk (group, identifier) datasets with one volume mapped
//!    at a time.
//!
//! Volume I/O goes through the [`volume`] traits; [`mrc`] provides the
//! memory-mapped MRC implementation.

pub mod boxes;
pub mod catalog;
pub mod error;
pub mod extract;
pub mod mrc;
pub mod volume;

pub use boxes::{label_centroids, present_ids, resolve, BoundingBox};
pub use catalog::{CatalogRow, ParticleCatalog};
pub use error::{ExtractError, Result};
pub use extract::{
    extract_all, Dataset, DatasetOutcome, DatasetSpec, ExtractOptions, Extractor, GroupSpec,
    LabelOptions, ParticleRecord, PathTable, TomoLocator,
};
pub use mrc::{MrcSource, MrcVolume, MrcWriter};
pub use volume::{ArrayVolume, SampleType, VolumeReader, VolumeSource, VolumeWriter};
