use nalgebra::DVector;

use crate::appearance_model::AppearanceModel;
use crate::config::Metric;
use crate::photo::Photo;
use crate::piecewise_warp::{rmse, warp};
use crate::pixel_map::TrianglePixels;
use crate::snapshot::ModelSnapshot;

/// Score of one sample against a model, with the reconstruction it came from.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub score: f64,
    /// Model reconstruction of the sample's centered texture.
    pub reconstruction: DVector<f64>,
}

/// Turns a sample and a model into an outlier score.
pub trait ScoreMetric: Send + Sync {
    fn metric(&self) -> Metric;

    /// Scores the sample at active position `pos` of `snapshot`.
    fn evaluate(&self, snapshot: &ModelSnapshot, pos: usize, model: &AppearanceModel) -> Evaluation;
}

/// Euclidean norm of the texture-space reconstruction residual.
pub struct TextureErrorScorer;

impl ScoreMetric for TextureErrorScorer {
    fn metric(&self) -> Metric {
        Metric::TextureError
    }

    fn evaluate(&self, snapshot: &ModelSnapshot, pos: usize, model: &AppearanceModel) -> Evaluation {
        let centered = snapshot.centered_texture(pos);
        let reconstruction = model.reconstruct_texture(centered);
        Evaluation {
            score: (centered - &reconstruction).norm(),
            reconstruction,
        }
    }
}

/// RMSE between the sample image and its reconstruction rendered back into
/// the sample's own frame.
pub struct FittingErrorScorer;

impl FittingErrorScorer {
    /// Renders a reconstruction into the image frame of sample `pos`.
    ///
    /// Only pixels covered by the sample's own mesh are painted; everything
    /// else stays black.
    pub fn render(snapshot: &ModelSnapshot, pos: usize, reconstruction: &DVector<f64>) -> Photo {
        render_into(snapshot, pos, reconstruction, &snapshot.sample_pixels(pos))
    }
}

fn render_into(
    snapshot: &ModelSnapshot,
    pos: usize,
    reconstruction: &DVector<f64>,
    pixels: &TrianglePixels,
) -> Photo {
    let canvas = snapshot.texture_to_canvas(&snapshot.unnormalize(pos, reconstruction));
    let image = &snapshot.sample(pos).image;
    warp(&canvas, &snapshot.warps(pos).forward, pixels, image.width, image.height)
}

impl ScoreMetric for FittingErrorScorer {
    fn metric(&self) -> Metric {
        Metric::FittingError
    }

    fn evaluate(&self, snapshot: &ModelSnapshot, pos: usize, model: &AppearanceModel) -> Evaluation {
        let reconstruction = model.reconstruct_texture(snapshot.centered_texture(pos));
        let pixels = snapshot.sample_pixels(pos);
        let fitted = render_into(snapshot, pos, &reconstruction, &pixels);
        Evaluation {
            score: rmse(&snapshot.sample(pos).image, &fitted, &pixels),
            reconstruction,
        }
    }
}

/// The scorer selected by `metric`.
pub fn scorer_for(metric: Metric) -> Box<dyn ScoreMetric> {
    match metric {
        Metric::TextureError => Box::new(TextureErrorScorer),
        Metric::FittingError => Box::new(FittingErrorScorer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AamConfig;
    use crate::shape::{Point, Shape, Triangulation};
    use crate::snapshot::{Dataset, Sample};

    fn dataset() -> Dataset {
        let shape = Shape::from_points(&[
            Point::new(8.0, 8.0),
            Point::new(40.0, 9.0),
            Point::new(38.0, 40.0),
            Point::new(9.0, 38.0),
        ]);
        let samples = (0..4)
            .map(|k| {
                let gain = 0.8 + 0.1 * k as f64;
                let image = Photo::from_fn(50, 50, |x, y| {
                    let (x, y) = (x as f64 / 6.0, y as f64 / 8.0);
                    [
                        gain * (0.5 + 0.3 * x.sin()),
                        gain * (0.5 + 0.3 * y.cos()),
                        gain * (0.4 + 0.2 * (x - y).sin()),
                    ]
                });
                Sample::new(image, shape.clone())
            })
            .collect();
        Dataset::new(samples, Triangulation::new(vec![[0, 1, 2], [0, 2, 3]])).unwrap()
    }

    #[test]
    fn photometric_copies_score_near_zero() {
        let data = dataset();
        let config = AamConfig {
            target_shape_size: 48.0,
            ..AamConfig::default()
        };
        let snap = ModelSnapshot::build(&data, &[0, 1, 2, 3], &config).unwrap();
        let model = AppearanceModel::fit(&snap, &[1, 2, 3], config.variance_retained).unwrap();

        let texture = TextureErrorScorer.evaluate(&snap, 0, &model);
        assert!(texture.score < 1e-6, "texture error {}", texture.score);
        assert_eq!(texture.reconstruction.len(), snap.centered_texture(0).len());
        assert_eq!(TextureErrorScorer.metric(), Metric::TextureError);

        let fitting = FittingErrorScorer.evaluate(&snap, 0, &model);
        assert!(fitting.score.is_finite());
        // only bilinear blending along the mesh border differs
        assert!(fitting.score < 0.3, "fitting error {}", fitting.score);

        let fitted = FittingErrorScorer::render(&snap, 0, &fitting.reconstruction);
        assert_eq!((fitted.width, fitted.height), (50, 50));
    }

    #[test]
    fn scorer_matches_requested_metric() {
        assert_eq!(scorer_for(Metric::FittingError).metric(), Metric::FittingError);
        assert_eq!(scorer_for(Metric::TextureError).metric(), Metric::TextureError);
    }
}
