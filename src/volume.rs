use crate::enums::Modality;

use ndarray::{Array3, Array5};

/// Grid every modality is resampled onto before stacking.
pub const TARGET_SHAPE: (usize, usize, usize) = (128, 128, 96);

/// Model input: (batch = 1, x, y, z, channel) with channels in [`Modality::ALL`] order.
pub type MultiModalTensor = Array5<f32>;

/// Model output: (batch = 1, x, y, z, class) relative class scores.
pub type ClassProbabilityTensor = Array5<f32>;

/// A decoded scalar volume indexed `[x, y, z]`.
#[derive(Debug, Clone)]
pub struct Volume {
    pub data: Array3<f64>,
    pub spacing: (f32, f32, f32),
    pub affine: [[f64; 4]; 4],
}

impl Volume {
    pub fn new(data: Array3<f64>, spacing: (f32, f32, f32), affine: [[f64; 4]; 4]) -> Self {
        Self {
            data,
            spacing,
            affine,
        }
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }
}

/// One value per modality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalitySet<T> {
    pub t1: T,
    pub t1ce: T,
    pub t2: T,
    pub flair: T,
}

impl<T> ModalitySet<T> {
    pub fn new(t1: T, t1ce: T, t2: T, flair: T) -> Self {
        Self {
            t1,
            t1ce,
            t2,
            flair,
        }
    }

    pub fn get(&self, modality: Modality) -> &T {
        match modality {
            Modality::T1 => &self.t1,
            Modality::T1ce => &self.t1ce,
            Modality::T2 => &self.t2,
            Modality::Flair => &self.flair,
        }
    }

    /// Entries in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (Modality, &T)> {
        Modality::ALL
            .into_iter()
            .map(move |modality| (modality, self.get(modality)))
    }
}

impl<T: Sync> ModalitySet<T> {
    /// Apply `f` to every modality in parallel.
    ///
    /// When several modalities fail, the error of the first one in channel
    /// order is returned.
    pub fn par_try_map<U, E, F>(&self, f: F) -> Result<ModalitySet<U>, E>
    where
        U: Send,
        E: Send,
        F: Fn(Modality, &T) -> Result<U, E> + Sync,
    {
        let ((t1, t1ce), (t2, flair)) = rayon::join(
            || {
                rayon::join(
                    || f(Modality::T1, &self.t1),
                    || f(Modality::T1ce, &self.t1ce),
                )
            },
            || {
                rayon::join(
                    || f(Modality::T2, &self.t2),
                    || f(Modality::Flair, &self.flair),
                )
            },
        );
        Ok(ModalitySet::new(t1?, t1ce?, t2?, flair?))
    }
}
