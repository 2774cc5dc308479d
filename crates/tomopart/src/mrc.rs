//! MRC volume I/O (modes 0, 1, 2 and 6).
//!
//! Layout: 1024-byte header, optional extended header, then samples with x
//! fastest, then y, then z. Header words are little-endian; only the
//! fields this crate needs are interpreted (dimensions, mode, extended
//! header size), the rest of the blob is carried through unchanged so
//! downstream tools keep their metadata.
//!
//! Reads are memory-mapped: opening a volume maps the file, decoding
//! touches only the requested box, and dropping the reader releases the
//! mapping.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use ndarray::Array3;

use crate::error::{ExtractError, Result};
use crate::volume::{SampleType, VolumeReader, VolumeSource, VolumeWriter};

pub const HEADER_LEN: usize = 1024;

const WORD_NX: usize = 0;
const WORD_NY: usize = 1;
const WORD_NZ: usize = 2;
const WORD_MODE: usize = 3;
const WORD_MX: usize = 7;
const WORD_CELL_A: usize = 10;
const WORD_MAPC: usize = 16;
const WORD_DMIN: usize = 19;
const WORD_NSYMBT: usize = 23;
const MAP_MAGIC_OFFSET: usize = 208;

fn mode_of(dtype: SampleType) -> i32 {
    match dtype {
        SampleType::I8 => 0,
        SampleType::I16 => 1,
        SampleType::F32 => 2,
        SampleType::U16 => 6,
    }
}

fn sample_len(mode: i32) -> Result<usize> {
    match mode {
        0 => Ok(1),
        1 | 6 => Ok(2),
        2 => Ok(4),
        other => Err(ExtractError::Volume(format!(
            "unsupported MRC mode {}",
            other
        ))),
    }
}

fn read_word_i32(header: &[u8], word: usize) -> i32 {
    let o = word * 4;
    i32::from_le_bytes([header[o], header[o + 1], header[o + 2], header[o + 3]])
}

fn write_word_i32(header: &mut [u8], word: usize, value: i32) {
    header[word * 4..word * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_word_f32(header: &mut [u8], word: usize, value: f32) {
    header[word * 4..word * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

/// Memory-mapped MRC volume.
pub struct MrcVolume {
    map: Mmap,
    header: Vec<u8>,
    shape: [usize; 3],
    mode: i32,
    data_offset: usize,
}

impl MrcVolume {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| ExtractError::Volume(format!("{}: {}", path.display(), e)))?;
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| ExtractError::Volume(format!("{}: {}", path.display(), e)))?;

        if map.len() < HEADER_LEN {
            return Err(ExtractError::Volume(format!(
                "{}: truncated header ({} bytes)",
                path.display(),
                map.len()
            )));
        }
        let header = map[..HEADER_LEN].to_vec();
        let nx = read_word_i32(&header, WORD_NX);
        let ny = read_word_i32(&header, WORD_NY);
        let nz = read_word_i32(&header, WORD_NZ);
        let mode = read_word_i32(&header, WORD_MODE);
        let nsymbt = read_word_i32(&header, WORD_NSYMBT);
        if nx <= 0 || ny <= 0 || nz <= 0 || nsymbt < 0 {
            return Err(ExtractError::Volume(format!(
                "{}: invalid dimensions {}x{}x{}",
                path.display(),
                nx,
                ny,
                nz
            )));
        }

        let shape = [nx as usize, ny as usize, nz as usize];
        let data_offset = HEADER_LEN + nsymbt as usize;
        let needed = data_offset + shape[0] * shape[1] * shape[2] * sample_len(mode)?;
        if map.len() < needed {
            return Err(ExtractError::Volume(format!(
                "{}: file too short for {}x{}x{} mode {} ({} < {})",
                path.display(),
                nx,
                ny,
                nz,
                mode,
                map.len(),
                needed
            )));
        }

        Ok(Self {
            map,
            header,
            shape,
            mode,
            data_offset,
        })
    }

    fn decode(&self, index: usize) -> f32 {
        let bytes = &self.map[self.data_offset..];
        match self.mode {
            0 => bytes[index] as i8 as f32,
            1 => {
                let o = index * 2;
                i16::from_le_bytes([bytes[o], bytes[o + 1]]) as f32
            }
            6 => {
                let o = index * 2;
                u16::from_le_bytes([bytes[o], bytes[o + 1]]) as f32
            }
            _ => {
                let o = index * 4;
                f32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
            }
        }
    }
}

impl VolumeReader for MrcVolume {
    fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn header(&self) -> Option<&[u8]> {
        Some(&self.header)
    }

    fn read_box(&self, left: [usize; 3], size: [usize; 3]) -> Result<Array3<f32>> {
        for axis in 0..3 {
            if left[axis] + size[axis] > self.shape[axis] {
                return Err(ExtractError::Volume(format!(
                    "box {:?}+{:?} outside volume {:?}",
                    left, size, self.shape
                )));
            }
        }
        let [nx, ny, _] = self.shape;
        let mut out = Array3::zeros((size[0], size[1], size[2]));
        for dz in 0..size[2] {
            for dy in 0..size[1] {
                let row = ((left[2] + dz) * ny + (left[1] + dy)) * nx + left[0];
                for dx in 0..size[0] {
                    out[[dx, dy, dz]] = self.decode(row + dx);
                }
            }
        }
        Ok(out)
    }
}

/// Opens `.mrc` files as memory-mapped volumes.
#[derive(Debug, Clone, Default)]
pub struct MrcSource;

impl VolumeSource for MrcSource {
    fn open(&self, path: &Path) -> Result<Box<dyn VolumeReader>> {
        Ok(Box::new(MrcVolume::open(path)?))
    }
}

/// Writes particle volumes as MRC files.
#[derive(Debug, Clone, Default)]
pub struct MrcWriter;

impl VolumeWriter for MrcWriter {
    fn write(
        &self,
        path: &Path,
        data: &Array3<f32>,
        dtype: SampleType,
        header: Option<&[u8]>,
    ) -> Result<()> {
        let (nx, ny, nz) = data.dim();
        let header = build_header(header, [nx, ny, nz], dtype, data);

        let mut file = File::create(path)
            .map_err(|e| ExtractError::Volume(format!("{}: {}", path.display(), e)))?;
        file.write_all(&header)?;

        let mut bytes = Vec::with_capacity(nx * ny * nz * 4);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let v = data[[x, y, z]];
                    match dtype {
                        SampleType::I8 => bytes.push(v as i8 as u8),
                        SampleType::I16 => bytes.extend_from_slice(&(v as i16).to_le_bytes()),
                        SampleType::U16 => bytes.extend_from_slice(&(v as u16).to_le_bytes()),
                        SampleType::F32 => bytes.extend_from_slice(&v.to_le_bytes()),
                    }
                }
            }
        }
        file.write_all(&bytes)?;
        Ok(())
    }
}

/// Header for a written particle: the source header with dimensions, mode,
/// extended-header size and density stats patched, or a minimal fresh one.
fn build_header(
    source: Option<&[u8]>,
    shape: [usize; 3],
    dtype: SampleType,
    data: &Array3<f32>,
) -> Vec<u8> {
    let mut header = match source {
        Some(blob) if blob.len() >= HEADER_LEN => blob[..HEADER_LEN].to_vec(),
        _ => fresh_header(),
    };
    for (i, &n) in shape.iter().enumerate() {
        write_word_i32(&mut header, WORD_NX + i, n as i32);
        write_word_i32(&mut header, WORD_MX + i, n as i32);
        write_word_f32(&mut header, WORD_CELL_A + i, n as f32);
    }
    write_word_i32(&mut header, WORD_MODE, mode_of(dtype));
    // the extended header is not carried into particles
    write_word_i32(&mut header, WORD_NSYMBT, 0);

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    for &v in data.iter() {
        min = min.min(v);
        max = max.max(v);
        sum += v as f64;
    }
    let mean = if data.is_empty() {
        0.0
    } else {
        (sum / data.len() as f64) as f32
    };
    write_word_f32(&mut header, WORD_DMIN, min);
    write_word_f32(&mut header, WORD_DMIN + 1, max);
    write_word_f32(&mut header, WORD_DMIN + 2, mean);
    header
}

fn fresh_header() -> Vec<u8> {
    let mut header = vec![0u8; HEADER_LEN];
    // axis order x, y, z
    for (i, axis) in (1..=3).enumerate() {
        write_word_i32(&mut header, WORD_MAPC + i, axis);
    }
    // orthogonal cell
    for i in 0..3 {
        write_word_f32(&mut header, 13 + i, 90.0);
    }
    header[MAP_MAGIC_OFFSET..MAP_MAGIC_OFFSET + 4].copy_from_slice(b"MAP ");
    // little-endian machine stamp
    header[MAP_MAGIC_OFFSET + 4] = 0x44;
    header[MAP_MAGIC_OFFSET + 5] = 0x44;
    header
}
