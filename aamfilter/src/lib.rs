//! # AamFilter Library
//!
//! The `aamfilter` library builds an active appearance model (shape and texture PCA)
//! from a set of face images annotated with a fixed set of landmarks, and uses it to find
//! the images that do not fit the rest of the dataset, e.g. because their landmarks were
//! placed in the wrong order or the image is corrupted.
//!
//! ## Overview of Modules
//!
//! - **`outlier_detector`**: Drives the detection passes. Each pass rebuilds the model on
//!   the current inliers, scores every sample, and removes those above `mean + k * sigma`
//!   until a pass removes nothing. The leave-one-out and robust PCA strategies live here.
//!
//! - **`snapshot`**: The input `Dataset` and the `ModelSnapshot` of everything derived from
//!   one active subset (mean shape, canonical pixel map, warps, normalised textures).
//!
//! - **`photo`**: Defines a basic `Photo` struct for storing RGB pixel data in `[0, 1]`,
//!   with bilinear sampling and landmark annotation.
//!
//! - **`shape`**: Landmark shapes and the triangulation shared by all of them.
//!
//! - **`similarity_transform`**: Least-squares scale, rotation and translation between two
//!   point sets.
//!
//! - **`shape_aligner`**: Iterative Procrustes alignment producing the canonical mean shape.
//!
//! - **`affine_transform`**: Provides the `AffineTransform` struct for 2D transformations,
//!   built exactly from three vertex correspondences.
//!
//! - **`pixel_map`**: Rasterises a triangulation into per-pixel triangle labels.
//!
//! - **`piecewise_warp`**: Per-triangle affine warping between a sample and the mean shape,
//!   and conversion between images and texture vectors.
//!
//! - **`texture`**: Photometric normalisation and the mean-texture fixed point.
//!
//! - **`pca`** / **`robust_pca`**: Principal component models and the low-rank plus sparse
//!   decomposition applied before fitting them in the robust strategy.
//!
//! - **`appearance_model`**: Shape and texture PCA models fitted on the same samples.
//!
//! - **`scoring`**: Texture-space and image-space outlier scores.
//!
//! - **`diagnostics`**: Per-sample images describing a fit, and the sink they are sent to.
//!
//! - **`config`** / **`error`**: Run configuration and the crate error type.

pub mod affine_transform;
pub mod appearance_model;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod outlier_detector;
pub mod pca;
pub mod photo;
pub mod piecewise_warp;
pub mod pixel_map;
pub mod robust_pca;
pub mod scoring;
pub mod shape;
pub mod shape_aligner;
pub mod similarity_transform;
pub mod snapshot;
pub mod texture;

pub use config::{AamConfig, Metric, RpcaConfig, Strategy};
pub use diagnostics::{DiagnosticsCollector, DiagnosticsSink, SampleDiagnostics, Verdict};
pub use error::{AamError, Result};
pub use outlier_detector::{DetectionReport, OutlierDetector, PassReport};
pub use photo::Photo;
pub use shape::{Point, Shape, Triangulation};
pub use snapshot::{Dataset, Sample};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
