use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::config::AamConfig;
use crate::error::{AamError, Result};
use crate::photo::Photo;
use crate::piecewise_warp::{extract_texture, fill_image, warp, TriangleWarps};
use crate::pixel_map::{PixelMap, TrianglePixels};
use crate::shape::{Shape, Triangulation};
use crate::shape_aligner::{MeanShape, ShapeAligner};
use crate::texture::{MeanTexture, Photometry, TextureNormalizer};

/// One annotated image.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: Photo,
    pub shape: Shape,
}

impl Sample {
    pub fn new(image: Photo, shape: Shape) -> Self {
        Self { image, shape }
    }
}

/// The immutable input of a run: samples sharing one mesh topology.
///
/// A sample's position in the dataset is its identity in every report.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<Sample>,
    triangulation: Triangulation,
}

impl Dataset {
    /// Checks that every shape has the same landmark count and that the
    /// triangulation only references existing landmarks.
    pub fn new(samples: Vec<Sample>, triangulation: Triangulation) -> Result<Self> {
        let expected = samples.first().ok_or(AamError::EmptyDataset)?.shape.num_points();
        for (sample, s) in samples.iter().enumerate() {
            let found = s.shape.num_points();
            if found != expected {
                return Err(AamError::InputShapeMismatch {
                    sample,
                    expected,
                    found,
                });
            }
        }
        triangulation.validate(expected)?;
        Ok(Self {
            samples,
            triangulation,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample(&self, idx: usize) -> &Sample {
        &self.samples[idx]
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }
}

/// Everything derived from one active subset of a dataset.
///
/// A snapshot is built once per detection pass and only read afterwards, so
/// it can be shared between scoring threads. Per-sample data is addressed by
/// position in the active subset.
pub struct ModelSnapshot<'a> {
    dataset: &'a Dataset,
    active: Vec<usize>,
    mean_shape: MeanShape,
    canvas_size: usize,
    canonical_pixels: TrianglePixels,
    warps: Vec<TriangleWarps>,
    textures: Vec<DVector<f64>>,
    mean_texture: MeanTexture,
}

impl<'a> ModelSnapshot<'a> {
    /// Derives the mean shape, canonical pixel map, per-sample warps and the
    /// normalised textures of the samples listed in `active`.
    pub fn build(dataset: &'a Dataset, active: &[usize], config: &AamConfig) -> Result<Self> {
        if active.is_empty() {
            return Err(AamError::EmptyDataset);
        }
        let triangulation = dataset.triangulation();

        let shapes: Vec<&Shape> = active.iter().map(|&i| &dataset.sample(i).shape).collect();
        let mean_shape = ShapeAligner::new(config)
            .compute_mean_shape(&shapes)
            .ok_or(AamError::EmptyDataset)?;

        let canvas_size = config.canvas_size();
        let canonical_pixels =
            PixelMap::rasterize(&mean_shape.shape, triangulation, canvas_size, canvas_size)
                .triangle_pixels(triangulation.len());
        if canonical_pixels.total() == 0 {
            return Err(AamError::EmptyCanonicalTexture);
        }
        debug!(
            "canonical frame {canvas_size}x{canvas_size}, {} texels",
            canonical_pixels.total()
        );

        let warps: Vec<TriangleWarps> = active
            .iter()
            .map(|&i| {
                let sample_shape = &dataset.sample(i).shape;
                let warps = TriangleWarps::between(sample_shape, &mean_shape.shape, triangulation);
                if warps.skipped() > 0 {
                    warn!("sample {i}: {} degenerate triangles skipped", warps.skipped());
                }
                warps
            })
            .collect();

        let textures: Vec<DVector<f64>> = active
            .par_iter()
            .zip(warps.par_iter())
            .map(|(&i, w)| {
                let warped = warp(
                    &dataset.sample(i).image,
                    &w.inverse,
                    &canonical_pixels,
                    canvas_size,
                    canvas_size,
                );
                extract_texture(&warped, &canonical_pixels)
            })
            .collect();

        let mean_texture = TextureNormalizer::new(config)
            .compute_mean_texture(&textures)
            .ok_or(AamError::EmptyDataset)?;

        Ok(Self {
            dataset,
            active: active.to_vec(),
            mean_shape,
            canvas_size,
            canonical_pixels,
            warps,
            textures,
            mean_texture,
        })
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Dataset indices of the active samples.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Sample at active position `pos`.
    pub fn sample(&self, pos: usize) -> &'a Sample {
        self.dataset.sample(self.active[pos])
    }

    pub fn mean_shape(&self) -> &MeanShape {
        &self.mean_shape
    }

    pub fn canvas_size(&self) -> usize {
        self.canvas_size
    }

    pub fn canonical_pixels(&self) -> &TrianglePixels {
        &self.canonical_pixels
    }

    pub fn warps(&self, pos: usize) -> &TriangleWarps {
        &self.warps[pos]
    }

    /// Texture sampled from the image before photometric normalisation.
    pub fn raw_texture(&self, pos: usize) -> &DVector<f64> {
        &self.textures[pos]
    }

    /// Normalised texture with the mean texture subtracted.
    pub fn centered_texture(&self, pos: usize) -> &DVector<f64> {
        &self.mean_texture.centered[pos]
    }

    pub fn photometry(&self, pos: usize) -> &Photometry {
        &self.mean_texture.photometry[pos]
    }

    pub fn mean_texture(&self) -> &MeanTexture {
        &self.mean_texture
    }

    /// Maps a centered texture back to image intensities of sample `pos`.
    pub fn unnormalize(&self, pos: usize, centered: &DVector<f64>) -> DVector<f64> {
        self.photometry(pos).denormalize(&(centered + &self.mean_texture.mean))
    }

    /// Fills a texture into the canonical canvas.
    pub fn texture_to_canvas(&self, texture: &DVector<f64>) -> Photo {
        fill_image(texture, &self.canonical_pixels, self.canvas_size, self.canvas_size)
    }

    /// Pixel coordinates of sample `pos` in its own image, grouped by triangle.
    pub fn sample_pixels(&self, pos: usize) -> TrianglePixels {
        let sample = self.sample(pos);
        let triangulation = self.dataset.triangulation();
        PixelMap::rasterize(
            &sample.shape,
            triangulation,
            sample.image.width,
            sample.image.height,
        )
        .triangle_pixels(triangulation.len())
    }

    /// Aligned shapes of the given positions, one per row.
    pub fn shape_matrix(&self, positions: &[usize]) -> DMatrix<f64> {
        let aligned = &self.mean_shape.aligned;
        let dim = aligned.first().map_or(0, |s| s.as_flat().len());
        DMatrix::from_fn(positions.len(), dim, |r, c| aligned[positions[r]].as_flat()[c])
    }

    /// Centered textures of the given positions, one per row.
    pub fn texture_matrix(&self, positions: &[usize]) -> DMatrix<f64> {
        let centered = &self.mean_texture.centered;
        let dim = self.mean_texture.mean.len();
        DMatrix::from_fn(positions.len(), dim, |r, c| centered[positions[r]][c])
    }
}
