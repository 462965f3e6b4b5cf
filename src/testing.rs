//! In-memory NIfTI builders for unit tests.

use byteorder::{ByteOrder, LittleEndian};

pub(crate) struct HeaderSpec {
    pub dims: Vec<usize>,
    pub datatype: i16,
    pub bitpix: i16,
    pub pixdim: [f32; 3],
    pub scaling: (f32, f32),
    pub sform: Option<[[f64; 4]; 3]>,
}

impl HeaderSpec {
    pub fn float32(shape: (usize, usize, usize)) -> Self {
        Self::with_type(vec![shape.0, shape.1, shape.2], 16, 32)
    }

    pub fn with_type(dims: Vec<usize>, datatype: i16, bitpix: i16) -> Self {
        Self {
            dims,
            datatype,
            bitpix,
            pixdim: [1.0; 3],
            scaling: (1.0, 0.0),
            sform: None,
        }
    }
}

/// NIfTI-1 container holding `values` as float32, x varying fastest.
pub(crate) fn nifti1_bytes<E: ByteOrder>(spec: &HeaderSpec, values: &[f32]) -> Vec<u8> {
    let mut payload = vec![0u8; values.len() * 4];
    for (chunk, &value) in payload.chunks_exact_mut(4).zip(values) {
        E::write_f32(chunk, value);
    }
    nifti1_raw::<E>(spec, &payload)
}

/// NIfTI-1 container with an arbitrary voxel payload.
pub(crate) fn nifti1_raw<E: ByteOrder>(spec: &HeaderSpec, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 352];
    E::write_i32(&mut buf[0..4], 348);
    E::write_i16(&mut buf[40..42], spec.dims.len() as i16);
    for i in 0..7 {
        let extent = spec.dims.get(i).copied().unwrap_or(1);
        E::write_i16(&mut buf[42 + i * 2..44 + i * 2], extent as i16);
    }
    E::write_i16(&mut buf[70..72], spec.datatype);
    E::write_i16(&mut buf[72..74], spec.bitpix);
    E::write_f32(&mut buf[76..80], 1.0);
    for (i, &spacing) in spec.pixdim.iter().enumerate() {
        E::write_f32(&mut buf[80 + i * 4..84 + i * 4], spacing);
    }
    E::write_f32(&mut buf[108..112], 352.0);
    E::write_f32(&mut buf[112..116], spec.scaling.0);
    E::write_f32(&mut buf[116..120], spec.scaling.1);
    if let Some(rows) = spec.sform {
        E::write_i16(&mut buf[254..256], 1);
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                let offset = 280 + (r * 4 + c) * 4;
                E::write_f32(&mut buf[offset..offset + 4], value as f32);
            }
        }
    }
    buf[344..348].copy_from_slice(b"n+1\0");
    buf.extend_from_slice(payload);
    buf
}

/// Little-endian NIfTI-2 container holding `values` as float32.
pub(crate) fn nifti2_bytes(spec: &HeaderSpec, values: &[f32]) -> Vec<u8> {
    let mut buf = vec![0u8; 544];
    LittleEndian::write_i32(&mut buf[0..4], 540);
    buf[4..12].copy_from_slice(b"n+2\0\r\n\x1a\n");
    LittleEndian::write_i16(&mut buf[12..14], spec.datatype);
    LittleEndian::write_i16(&mut buf[14..16], spec.bitpix);
    LittleEndian::write_i64(&mut buf[16..24], spec.dims.len() as i64);
    for i in 0..7 {
        let extent = spec.dims.get(i).copied().unwrap_or(1);
        LittleEndian::write_i64(&mut buf[24 + i * 8..32 + i * 8], extent as i64);
    }
    LittleEndian::write_f64(&mut buf[104..112], 1.0);
    for (i, &spacing) in spec.pixdim.iter().enumerate() {
        let offset = 112 + i * 8;
        LittleEndian::write_f64(&mut buf[offset..offset + 8], f64::from(spacing));
    }
    LittleEndian::write_i64(&mut buf[168..176], 544);
    LittleEndian::write_f64(&mut buf[176..184], f64::from(spec.scaling.0));
    LittleEndian::write_f64(&mut buf[184..192], f64::from(spec.scaling.1));
    for &value in values {
        let mut word = [0u8; 4];
        LittleEndian::write_f32(&mut word, value);
        buf.extend_from_slice(&word);
    }
    buf
}
