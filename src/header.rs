//! NIfTI header parsing.
//!
//! Handles NIfTI-1 (348-byte) and NIfTI-2 (540-byte) single-file headers in
//! either byte order. Only the fields needed to locate, type and place the
//! voxel data are kept.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::volume_loader::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiVersion {
    Nifti1,
    Nifti2,
}

impl NiftiVersion {
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }
}

mod offsets_v1 {
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN_B: usize = 256;
    pub const QOFFSET_X: usize = 268;
    pub const SROW_X: usize = 280;
    pub const MAGIC: usize = 344;
}

mod offsets_v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN_B: usize = 352;
    pub const QOFFSET_X: usize = 376;
    pub const SROW_X: usize = 400;
}

/// Voxel storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    UInt8 = 2,
    Int16 = 4,
    Int32 = 8,
    Float32 = 16,
    Float64 = 64,
    Int8 = 256,
    UInt16 = 512,
    UInt32 = 768,
    Int64 = 1024,
    UInt64 = 1280,
    /// IEEE 754 half precision (non-standard code)
    Float16 = 16384,
    /// bfloat16 (non-standard code)
    BFloat16 = 16385,
}

impl DataType {
    pub fn from_code(code: i16) -> Result<Self, DecodeError> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::UInt64),
            16384 => Ok(Self::Float16),
            16385 => Ok(Self::BFloat16),
            _ => Err(DecodeError::UnsupportedDataType(code)),
        }
    }

    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }
}

/// Parsed header, widened to NIfTI-2 precision.
#[derive(Debug, Clone)]
pub struct NiftiHeader {
    pub version: NiftiVersion,
    /// Number of used dimensions (1-7).
    pub ndim: usize,
    pub dim: [usize; 7],
    pub datatype: DataType,
    /// qfac at index 0, voxel sizes at 1..=ndim.
    pub pixdim: [f64; 8],
    /// Byte offset of the voxel data.
    pub vox_offset: usize,
    pub scl_slope: f64,
    pub scl_inter: f64,
    pub qform_code: i32,
    pub sform_code: i32,
    pub quatern: [f64; 3],
    pub qoffset: [f64; 3],
    pub srow: [[f64; 4]; 3],
    little_endian: bool,
}

impl NiftiHeader {
    /// Read a header with automatic version and byte order detection.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::Truncated {
                needed: 4,
                available: bytes.len(),
            });
        }

        let sizeof_hdr_le = LittleEndian::read_i32(&bytes[0..4]);
        let sizeof_hdr_be = BigEndian::read_i32(&bytes[0..4]);

        let (version, little_endian) = match (sizeof_hdr_le, sizeof_hdr_be) {
            (348, _) => (NiftiVersion::Nifti1, true),
            (_, 348) => (NiftiVersion::Nifti1, false),
            (540, _) => (NiftiVersion::Nifti2, true),
            (_, 540) => (NiftiVersion::Nifti2, false),
            _ => {
                return Err(DecodeError::UnrecognizedHeader(format!(
                    "sizeof_hdr is neither 348 nor 540 (read {sizeof_hdr_le})"
                )));
            }
        };

        let required = version.header_size();
        if bytes.len() < required {
            return Err(DecodeError::Truncated {
                needed: required,
                available: bytes.len(),
            });
        }

        let header = match (version, little_endian) {
            (NiftiVersion::Nifti1, true) => Self::parse_v1::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti1, false) => Self::parse_v1::<BigEndian>(bytes, false),
            (NiftiVersion::Nifti2, true) => Self::parse_v2::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti2, false) => Self::parse_v2::<BigEndian>(bytes, false),
        }?;
        header.validate()?;
        Ok(header)
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v1<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self, DecodeError> {
        use offsets_v1::*;

        match &bytes[MAGIC..MAGIC + 4] {
            b"n+1\0" => {}
            b"ni1\0" => return Err(DecodeError::DetachedData),
            other => {
                return Err(DecodeError::UnrecognizedHeader(format!(
                    "invalid NIfTI-1 magic {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        }

        let ndim = checked_ndim(i64::from(E::read_i16(&bytes[DIM..DIM + 2])))?;
        let mut raw_dim = [0i64; 7];
        for (i, value) in raw_dim.iter_mut().enumerate() {
            let offset = DIM + 2 + i * 2;
            *value = i64::from(E::read_i16(&bytes[offset..offset + 2]));
        }

        let datatype = checked_datatype(
            E::read_i16(&bytes[DATATYPE..DATATYPE + 2]),
            E::read_i16(&bytes[BITPIX..BITPIX + 2]),
        )?;

        let mut pixdim = [0.0f64; 8];
        for (i, value) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 4;
            *value = f64::from(E::read_f32(&bytes[offset..offset + 4]));
        }

        let read_f32 = |offset: usize| f64::from(E::read_f32(&bytes[offset..offset + 4]));
        let mut srow = [[0.0f64; 4]; 3];
        for (row, values) in srow.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = read_f32(SROW_X + (row * 4 + col) * 4);
            }
        }

        Ok(Self {
            version: NiftiVersion::Nifti1,
            ndim,
            dim: checked_dims(raw_dim)?,
            datatype,
            pixdim,
            vox_offset: checked_vox_offset(read_f32(VOX_OFFSET), NiftiVersion::Nifti1)?,
            scl_slope: read_f32(SCL_SLOPE),
            scl_inter: read_f32(SCL_INTER),
            qform_code: i32::from(E::read_i16(&bytes[QFORM_CODE..QFORM_CODE + 2])),
            sform_code: i32::from(E::read_i16(&bytes[SFORM_CODE..SFORM_CODE + 2])),
            quatern: [
                read_f32(QUATERN_B),
                read_f32(QUATERN_B + 4),
                read_f32(QUATERN_B + 8),
            ],
            qoffset: [
                read_f32(QOFFSET_X),
                read_f32(QOFFSET_X + 4),
                read_f32(QOFFSET_X + 8),
            ],
            srow,
            little_endian,
        })
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v2<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self, DecodeError> {
        use offsets_v2::*;

        match &bytes[MAGIC..MAGIC + 8] {
            b"n+2\0\r\n\x1a\n" => {}
            b"ni2\0\r\n\x1a\n" => return Err(DecodeError::DetachedData),
            other => {
                return Err(DecodeError::UnrecognizedHeader(format!(
                    "invalid NIfTI-2 magic {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        }

        let ndim = checked_ndim(E::read_i64(&bytes[DIM..DIM + 8]))?;
        let mut raw_dim = [0i64; 7];
        for (i, value) in raw_dim.iter_mut().enumerate() {
            let offset = DIM + 8 + i * 8;
            *value = E::read_i64(&bytes[offset..offset + 8]);
        }

        let datatype = checked_datatype(
            E::read_i16(&bytes[DATATYPE..DATATYPE + 2]),
            E::read_i16(&bytes[BITPIX..BITPIX + 2]),
        )?;

        let read_f64 = |offset: usize| E::read_f64(&bytes[offset..offset + 8]);
        let mut pixdim = [0.0f64; 8];
        for (i, value) in pixdim.iter_mut().enumerate() {
            *value = read_f64(PIXDIM + i * 8);
        }

        let mut srow = [[0.0f64; 4]; 3];
        for (row, values) in srow.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = read_f64(SROW_X + (row * 4 + col) * 8);
            }
        }

        let vox_offset = E::read_i64(&bytes[VOX_OFFSET..VOX_OFFSET + 8]);

        Ok(Self {
            version: NiftiVersion::Nifti2,
            ndim,
            dim: checked_dims(raw_dim)?,
            datatype,
            pixdim,
            vox_offset: checked_vox_offset(vox_offset as f64, NiftiVersion::Nifti2)?,
            scl_slope: read_f64(SCL_SLOPE),
            scl_inter: read_f64(SCL_INTER),
            qform_code: E::read_i32(&bytes[QFORM_CODE..QFORM_CODE + 4]),
            sform_code: E::read_i32(&bytes[SFORM_CODE..SFORM_CODE + 4]),
            quatern: [
                read_f64(QUATERN_B),
                read_f64(QUATERN_B + 8),
                read_f64(QUATERN_B + 16),
            ],
            qoffset: [
                read_f64(QOFFSET_X),
                read_f64(QOFFSET_X + 8),
                read_f64(QOFFSET_X + 16),
            ],
            srow,
            little_endian,
        })
    }

    /// Check the invariants every decodable header must satisfy.
    pub fn validate(&self) -> Result<(), DecodeError> {
        for (axis, &extent) in self.shape().iter().enumerate() {
            if extent == 0 {
                return Err(DecodeError::InvalidHeader(format!(
                    "dimension {} is zero",
                    axis + 1
                )));
            }
        }
        if self.scaling().is_some() && !self.scl_inter.is_finite() {
            return Err(DecodeError::InvalidHeader(format!(
                "scl_inter is {} with scl_slope {}",
                self.scl_inter, self.scl_slope
            )));
        }
        self.data_size()?;
        Ok(())
    }

    /// Extents of the used dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.dim[..self.ndim]
    }

    pub fn num_voxels(&self) -> Result<usize, DecodeError> {
        self.shape()
            .iter()
            .try_fold(1usize, |acc, &extent| acc.checked_mul(extent))
            .ok_or_else(|| DecodeError::InvalidHeader("voxel count overflows".into()))
    }

    /// Size of the voxel payload in bytes.
    pub fn data_size(&self) -> Result<usize, DecodeError> {
        self.num_voxels()?
            .checked_mul(self.datatype.byte_size())
            .ok_or_else(|| DecodeError::InvalidHeader("data size overflows".into()))
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Voxel spacing along the three spatial axes.
    pub fn spacing(&self) -> (f32, f32, f32) {
        (
            self.pixdim[1] as f32,
            self.pixdim[2] as f32,
            self.pixdim[3] as f32,
        )
    }

    /// Scaling to apply to stored values, or `None` when the stored values are final.
    pub fn scaling(&self) -> Option<(f64, f64)> {
        if self.scl_slope.is_finite() && self.scl_slope != 0.0 {
            Some((self.scl_slope, self.scl_inter))
        } else {
            None
        }
    }

    /// Voxel-to-world transform: sform if set, else qform, else pixdim scaling.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        if self.sform_code > 0 {
            [self.srow[0], self.srow[1], self.srow[2], [0.0, 0.0, 0.0, 1.0]]
        } else if self.qform_code > 0 {
            self.qform_to_affine()
        } else {
            [
                [self.pixdim[1], 0.0, 0.0, 0.0],
                [0.0, self.pixdim[2], 0.0, 0.0],
                [0.0, 0.0, self.pixdim[3], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    #[allow(clippy::many_single_char_names)]
    fn qform_to_affine(&self) -> [[f64; 4]; 4] {
        let [b, c, d] = self.quatern;
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let [i, j, k] = [
            self.pixdim[1].abs(),
            self.pixdim[2].abs(),
            self.pixdim[3].abs() * qfac,
        ];

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                self.qoffset[0],
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a - b * b + c * c - d * d) * j,
                2.0 * (c * d - a * b) * k,
                self.qoffset[1],
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a - b * b - c * c + d * d) * k,
                self.qoffset[2],
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

fn checked_ndim(raw: i64) -> Result<usize, DecodeError> {
    if (1..=7).contains(&raw) {
        Ok(raw as usize)
    } else {
        Err(DecodeError::InvalidHeader(format!(
            "dim[0] must be 1..=7, got {raw}"
        )))
    }
}

fn checked_dims(raw: [i64; 7]) -> Result<[usize; 7], DecodeError> {
    let mut dim = [0usize; 7];
    for (i, (&value, slot)) in raw.iter().zip(dim.iter_mut()).enumerate() {
        *slot = usize::try_from(value).map_err(|_| {
            DecodeError::InvalidHeader(format!("dimension {} has negative value {value}", i + 1))
        })?;
    }
    Ok(dim)
}

fn checked_datatype(code: i16, bitpix: i16) -> Result<DataType, DecodeError> {
    let datatype = DataType::from_code(code)?;
    let expected = (datatype.byte_size() * 8) as i16;
    if bitpix != expected {
        return Err(DecodeError::InvalidHeader(format!(
            "bitpix {bitpix} does not match datatype code {code} (expected {expected})"
        )));
    }
    Ok(datatype)
}

fn checked_vox_offset(raw: f64, version: NiftiVersion) -> Result<usize, DecodeError> {
    if !raw.is_finite() || raw.fract() != 0.0 {
        return Err(DecodeError::InvalidHeader(format!(
            "vox_offset must be a finite integer, got {raw}"
        )));
    }
    if raw < version.header_size() as f64 {
        return Err(DecodeError::InvalidHeader(format!(
            "vox_offset {raw} lies inside the {}-byte header",
            version.header_size()
        )));
    }
    Ok(raw as usize)
}
