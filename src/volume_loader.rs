use crate::header::{DataType, NiftiHeader};
use crate::volume::Volume;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::MultiGzDecoder;
use half::{bf16, f16};
use ndarray::{Array3, ShapeBuilder};
use rayon::prelude::*;
use std::borrow::Cow;
use std::io::Read;
use std::{fs, path::Path};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("container truncated: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unrecognized header: {0}")]
    UnrecognizedHeader(String),

    #[error("header references a separate data file")]
    DetachedData,

    #[error("unsupported data type code {0}")]
    UnsupportedDataType(i16),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("expected a 3D volume: {0}")]
    Dimensionality(String),

    #[error("voxel data cannot be shaped to {shape:?}: {source}")]
    Reshape {
        shape: (usize, usize, usize),
        #[source]
        source: ndarray::ShapeError,
    },

    #[error("gzip decompression failed: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Decode a NIfTI container held in memory.
    ///
    /// Gzip-compressed input is detected by its magic bytes. Stored values
    /// are widened to `f64` with the header scaling applied.
    ///
    /// # Errors
    ///
    /// Returns error if the header is invalid, the payload is shorter than
    /// the header declares, or the image is not three-dimensional
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Volume, DecodeError> {
        let bytes = Self::decompress(bytes)?;
        let header = NiftiHeader::from_bytes(&bytes)?;
        let shape = Self::spatial_shape(&header)?;

        let start = header.vox_offset;
        let end = start
            .checked_add(header.data_size()?)
            .ok_or_else(|| DecodeError::InvalidHeader("data range overflows".into()))?;
        if bytes.len() < end {
            return Err(DecodeError::Truncated {
                needed: end,
                available: bytes.len(),
            });
        }

        let raw = &bytes[start..end];
        let mut values = if header.is_little_endian() {
            Self::decode_voxels::<LittleEndian>(header.datatype, raw)
        } else {
            Self::decode_voxels::<BigEndian>(header.datatype, raw)
        };

        if let Some((slope, intercept)) = header.scaling() {
            values
                .par_iter_mut()
                .for_each(|v| *v = *v * slope + intercept);
        }

        let data = Self::build_volume_array(values, shape)?;
        Ok(Volume::new(data, header.spacing(), header.affine()))
    }

    /// Load a volume from a `.nii` or `.nii.gz` file
    pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<Volume, DecodeError> {
        let bytes = fs::read(path.as_ref())?;
        Self::load_from_bytes(&bytes)
    }

    fn decompress(bytes: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
        if !bytes.starts_with(&GZIP_MAGIC) {
            return Ok(Cow::Borrowed(bytes));
        }
        let mut decompressed = Vec::with_capacity(bytes.len() * 4);
        MultiGzDecoder::new(bytes)
            .read_to_end(&mut decompressed)
            .map_err(DecodeError::Gzip)?;
        Ok(Cow::Owned(decompressed))
    }

    /// Spatial extent, ignoring trailing singleton dimensions.
    fn spatial_shape(header: &NiftiHeader) -> Result<(usize, usize, usize), DecodeError> {
        match header.shape() {
            [x, y, z, rest @ ..] if rest.iter().all(|&extent| extent == 1) => Ok((*x, *y, *z)),
            [_, _, _, rest @ ..] => Err(DecodeError::Dimensionality(format!(
                "extra dimensions {rest:?} are not singleton"
            ))),
            shape => Err(DecodeError::Dimensionality(format!(
                "header declares {} dimension(s)",
                shape.len()
            ))),
        }
    }

    fn decode_voxels<E: ByteOrder>(datatype: DataType, raw: &[u8]) -> Vec<f64> {
        let chunks = raw.par_chunks_exact(datatype.byte_size());
        match datatype {
            DataType::UInt8 => raw.par_iter().map(|&v| f64::from(v)).collect(),
            DataType::Int8 => raw.par_iter().map(|&v| f64::from(v as i8)).collect(),
            DataType::Int16 => chunks.map(|c| f64::from(E::read_i16(c))).collect(),
            DataType::UInt16 => chunks.map(|c| f64::from(E::read_u16(c))).collect(),
            DataType::Int32 => chunks.map(|c| f64::from(E::read_i32(c))).collect(),
            DataType::UInt32 => chunks.map(|c| f64::from(E::read_u32(c))).collect(),
            DataType::Int64 => chunks.map(|c| E::read_i64(c) as f64).collect(),
            DataType::UInt64 => chunks.map(|c| E::read_u64(c) as f64).collect(),
            DataType::Float16 => chunks
                .map(|c| f16::from_bits(E::read_u16(c)).to_f64())
                .collect(),
            DataType::BFloat16 => chunks
                .map(|c| bf16::from_bits(E::read_u16(c)).to_f64())
                .collect(),
            DataType::Float32 => chunks.map(|c| f64::from(E::read_f32(c))).collect(),
            DataType::Float64 => chunks.map(|c| E::read_f64(c)).collect(),
        }
    }

    /// Voxels are stored x-fastest; the returned array is in standard layout.
    fn build_volume_array(
        values: Vec<f64>,
        shape: (usize, usize, usize),
    ) -> Result<Array3<f64>, DecodeError> {
        let fortran = Array3::from_shape_vec(shape.f(), values)
            .map_err(|source| DecodeError::Reshape { shape, source })?;
        Ok(fortran.as_standard_layout().into_owned())
    }
}
