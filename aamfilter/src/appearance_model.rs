use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::pca::PcaModel;
use crate::snapshot::ModelSnapshot;

/// Shape and texture PCA models fitted on the same samples.
#[derive(Debug, Clone)]
pub struct AppearanceModel {
    /// Model over Procrustes-aligned shapes.
    pub shape: PcaModel,
    /// Model over normalised, mean-subtracted textures.
    pub texture: PcaModel,
}

impl AppearanceModel {
    /// Fits both models on the snapshot samples at `positions`.
    pub fn fit(snapshot: &ModelSnapshot, positions: &[usize], retained: f64) -> Option<Self> {
        Self::from_matrices(
            &snapshot.shape_matrix(positions),
            &snapshot.texture_matrix(positions),
            retained,
        )
    }

    /// Fits both models on data matrices holding one sample per row.
    pub fn from_matrices(shapes: &DMatrix<f64>, textures: &DMatrix<f64>, retained: f64) -> Option<Self> {
        let shape = PcaModel::build(shapes, retained)?;
        let texture = PcaModel::build(textures, retained)?;
        debug!(
            "appearance model: {} shape / {} texture components from {} samples",
            shape.num_components(),
            texture.num_components(),
            shapes.nrows()
        );
        Some(Self { shape, texture })
    }

    /// Closest texture the texture model can express.
    pub fn reconstruct_texture(&self, centered: &DVector<f64>) -> DVector<f64> {
        self.texture.approximate(centered)
    }

    /// Closest aligned shape the shape model can express.
    pub fn reconstruct_shape(&self, aligned: &DVector<f64>) -> DVector<f64> {
        self.shape.approximate(aligned)
    }
}
