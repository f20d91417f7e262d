use std::collections::BTreeMap;

use nalgebra::DVector;
use serde::Serialize;

use crate::config::Metric;
use crate::error::Result;
use crate::photo::Photo;
use crate::scoring::FittingErrorScorer;
use crate::snapshot::ModelSnapshot;

/// Classification of a scored sample within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Inlier,
    Outlier,
}

/// Images describing how well the model explains one sample.
#[derive(Debug, Clone)]
pub struct SampleDiagnostics {
    /// The sample image with its landmarks drawn on.
    pub annotated: Photo,
    /// Unnormalised model reconstruction in the canonical frame.
    pub reconstructed_texture: Photo,
    /// The sample's own texture in the canonical frame.
    pub warped_reference: Photo,
    /// Reconstruction warped back into the sample image; fitting-error runs only.
    pub fitted: Option<Photo>,
}

impl SampleDiagnostics {
    pub fn render(
        snapshot: &ModelSnapshot,
        pos: usize,
        reconstruction: &DVector<f64>,
        metric: Metric,
    ) -> Self {
        let sample = snapshot.sample(pos);
        let fitted = match metric {
            Metric::FittingError => Some(FittingErrorScorer::render(snapshot, pos, reconstruction)),
            Metric::TextureError => None,
        };
        Self {
            annotated: sample.image.annotated_with(&sample.shape),
            reconstructed_texture: snapshot
                .texture_to_canvas(&snapshot.unnormalize(pos, reconstruction)),
            warped_reference: snapshot.texture_to_canvas(snapshot.raw_texture(pos)),
            fitted,
        }
    }
}

/// Receives diagnostics while the detector runs.
///
/// Every pass starts with `begin_pass` and then records each scored sample
/// once. Inliers of a pass are scored again by the next one, so only the
/// inliers recorded after the last `begin_pass` are final; outliers are
/// recorded exactly once.
pub trait DiagnosticsSink {
    fn begin_pass(&mut self, pass: usize) -> Result<()>;

    fn record(&mut self, sample: usize, verdict: Verdict, diagnostics: SampleDiagnostics) -> Result<()>;
}

/// Keeps diagnostics in memory, keyed by dataset index.
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    pub inliers: BTreeMap<usize, SampleDiagnostics>,
    pub outliers: BTreeMap<usize, SampleDiagnostics>,
}

impl DiagnosticsSink for DiagnosticsCollector {
    fn begin_pass(&mut self, _pass: usize) -> Result<()> {
        self.inliers.clear();
        Ok(())
    }

    fn record(&mut self, sample: usize, verdict: Verdict, diagnostics: SampleDiagnostics) -> Result<()> {
        match verdict {
            Verdict::Inlier => self.inliers.insert(sample, diagnostics),
            Verdict::Outlier => self.outliers.insert(sample, diagnostics),
        };
        Ok(())
    }
}
