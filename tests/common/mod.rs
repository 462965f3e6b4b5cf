//! Shared fixtures for integration tests.

#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};
use flate2::{Compression, write::GzEncoder};
use ndarray::{Array5, Axis};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use tumor_volume::engine::InferenceError;
use tumor_volume::volume::{ClassProbabilityTensor, MultiModalTensor};
use tumor_volume::SegmentationEngine;

/// Float32 NIfTI-1 container; `value` is called with `(x, y, z)` and the
/// payload is written x varying fastest.
pub fn nifti1<E, F>(shape: (usize, usize, usize), value: F) -> Vec<u8>
where
    E: ByteOrder,
    F: Fn(usize, usize, usize) -> f32,
{
    let (nx, ny, nz) = shape;
    let mut buf = vec![0u8; 352];
    E::write_i32(&mut buf[0..4], 348);
    E::write_i16(&mut buf[40..42], 3);
    E::write_i16(&mut buf[42..44], nx as i16);
    E::write_i16(&mut buf[44..46], ny as i16);
    E::write_i16(&mut buf[46..48], nz as i16);
    for i in 3..7 {
        E::write_i16(&mut buf[42 + i * 2..44 + i * 2], 1);
    }
    E::write_i16(&mut buf[70..72], 16);
    E::write_i16(&mut buf[72..74], 32);
    for i in 0..4 {
        E::write_f32(&mut buf[76 + i * 4..80 + i * 4], 1.0);
    }
    E::write_f32(&mut buf[108..112], 352.0);
    buf[344..348].copy_from_slice(b"n+1\0");

    let mut word = [0u8; 4];
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                E::write_f32(&mut word, value(x, y, z));
                buf.extend_from_slice(&word);
            }
        }
    }
    buf
}

pub fn constant(shape: (usize, usize, usize), value: f32) -> Vec<u8> {
    nifti1::<LittleEndian, _>(shape, |_, _, _| value)
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Engine that scores every voxel highest for one class.
pub struct ConstantClass {
    pub class: usize,
    pub classes: usize,
}

impl SegmentationEngine for ConstantClass {
    fn predict(&self, input: &MultiModalTensor) -> Result<ClassProbabilityTensor, InferenceError> {
        let (batch, x, y, z, _) = input.dim();
        let mut scores = Array5::<f32>::from_elem((batch, x, y, z, self.classes), 0.1);
        scores.index_axis_mut(Axis(4), self.class).fill(0.7);
        Ok(scores)
    }
}

/// Engine returning scores on a fixed, possibly wrong, grid.
pub struct FixedShape(pub (usize, usize, usize, usize, usize));

impl SegmentationEngine for FixedShape {
    fn predict(&self, _input: &MultiModalTensor) -> Result<ClassProbabilityTensor, InferenceError> {
        Ok(Array5::zeros(self.0))
    }
}

/// Engine whose forward pass always fails; counts its calls.
#[derive(Default)]
pub struct Failing {
    pub calls: AtomicUsize,
}

impl SegmentationEngine for Failing {
    fn predict(&self, _input: &MultiModalTensor) -> Result<ClassProbabilityTensor, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(InferenceError::Backend("out of device memory".into()))
    }
}
