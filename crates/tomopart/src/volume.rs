//! Volume model and abstract volume I/O.
//!
//! Volumes are indexed `[x, y, z]` with x fastest in file order. Readers
//! decode boxes on demand so a large tomogram never has to be fully
//! materialized for particle extraction; writers preserve the source
//! header when one is available.

use std::path::Path;

use ndarray::Array3;

use crate::error::Result;

/// Output sample type of a written particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    I8,
    I16,
    U16,
    F32,
}

impl SampleType {
    /// Representable range, for clipping before an integer cast.
    ///
    /// `F32` reports an infinite range: no clipping applies.
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            Self::I8 => (i8::MIN as f32, i8::MAX as f32),
            Self::I16 => (i16::MIN as f32, i16::MAX as f32),
            Self::U16 => (u16::MIN as f32, u16::MAX as f32),
            Self::F32 => (f32::NEG_INFINITY, f32::INFINITY),
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::F32)
    }
}

/// Read access to one volumetric dataset.
pub trait VolumeReader {
    /// Extent along x, y, z.
    fn shape(&self) -> [usize; 3];

    /// Raw header blob to propagate to outputs, when the format has one.
    fn header(&self) -> Option<&[u8]>;

    /// Decode the box at `left` with extent `size` into an owned array.
    fn read_box(&self, left: [usize; 3], size: [usize; 3]) -> Result<Array3<f32>>;

    /// Decode the whole volume.
    fn read_all(&self) -> Result<Array3<f32>> {
        self.read_box([0, 0, 0], self.shape())
    }
}

/// Opens volumes by path.
pub trait VolumeSource {
    fn open(&self, path: &Path) -> Result<Box<dyn VolumeReader>>;
}

/// Writes one particle volume per call.
pub trait VolumeWriter {
    fn write(
        &self,
        path: &Path,
        data: &Array3<f32>,
        dtype: SampleType,
        header: Option<&[u8]>,
    ) -> Result<()>;
}

/// In-memory volume, for synthetic data and tests.
#[derive(Debug, Clone)]
pub struct ArrayVolume {
    data: Array3<f32>,
}

impl ArrayVolume {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }
}

impl VolumeReader for ArrayVolume {
    fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.data.dim();
        [x, y, z]
    }

    fn header(&self) -> Option<&[u8]> {
        None
    }

    fn read_box(&self, left: [usize; 3], size: [usize; 3]) -> Result<Array3<f32>> {
        let view = self.data.slice(ndarray::s![
            left[0]..left[0] + size[0],
            left[1]..left[1] + size[1],
            left[2]..left[2] + size[2]
        ]);
        Ok(view.to_owned())
    }
}
