use log::{debug, info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::Serialize;

use crate::appearance_model::AppearanceModel;
use crate::config::{AamConfig, Metric, RpcaConfig, Strategy};
use crate::diagnostics::{DiagnosticsSink, SampleDiagnostics, Verdict};
use crate::error::{AamError, Result};
use crate::robust_pca::RobustPca;
use crate::scoring::{scorer_for, Evaluation, ScoreMetric};
use crate::snapshot::{Dataset, ModelSnapshot};

/// Scores of one pass, in active-subset order.
pub struct StrategyScores {
    pub evaluations: Vec<Evaluation>,
    /// Set when the model had to be fitted on data that could not be cleaned.
    pub degraded: bool,
}

/// Decides which model every active sample is scored against.
pub trait OutlierStrategy: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Scores every sample of `snapshot`. `pass` is only used for error context.
    fn score(&self, snapshot: &ModelSnapshot, metric: &dyn ScoreMetric, pass: usize) -> Result<StrategyScores>;
}

/// Scores each sample against a model fitted on all other active samples.
pub struct LeaveOneOutStrategy {
    retained: f64,
}

impl LeaveOneOutStrategy {
    pub fn new(retained: f64) -> Self {
        Self { retained }
    }
}

impl OutlierStrategy for LeaveOneOutStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::LeaveOneOut
    }

    fn score(&self, snapshot: &ModelSnapshot, metric: &dyn ScoreMetric, pass: usize) -> Result<StrategyScores> {
        let n = snapshot.len();
        let too_few = AamError::TooFewSamples {
            iteration: pass,
            needed: 2,
            found: n,
        };
        if n < 2 {
            return Err(too_few);
        }

        let evaluations = (0..n)
            .into_par_iter()
            .map(|pos| {
                let others: Vec<usize> = (0..n).filter(|&p| p != pos).collect();
                let model = AppearanceModel::fit(snapshot, &others, self.retained)
                    .ok_or_else(|| too_few.clone())?;
                let evaluation = metric.evaluate(snapshot, pos, &model);
                debug!("sample {}: score {:.6}", snapshot.active()[pos], evaluation.score);
                Ok(evaluation)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StrategyScores {
            evaluations,
            degraded: false,
        })
    }
}

/// Scores every sample against one model fitted on the low-rank part of
/// the active data.
pub struct RobustPcaStrategy {
    retained: f64,
    rpca: RpcaConfig,
}

impl RobustPcaStrategy {
    pub fn new(retained: f64, rpca: RpcaConfig) -> Self {
        Self { retained, rpca }
    }

    /// Low-rank part of `data` (one sample per row), or `data` itself when
    /// the solver gives up.
    fn recover(&self, data: DMatrix<f64>, what: &str, degraded: &mut bool) -> DMatrix<f64> {
        match RobustPca::new(&self.rpca).decompose(&data.transpose()) {
            Ok(split) => {
                debug!("{what}: robust recovery took {} iterations", split.iterations);
                split.low_rank.transpose()
            }
            Err(e) => {
                warn!("{what}: {e}, fitting on the raw data instead");
                *degraded = true;
                data
            }
        }
    }
}

impl OutlierStrategy for RobustPcaStrategy {
    fn strategy(&self) -> Strategy {
        Strategy::RobustPca
    }

    fn score(&self, snapshot: &ModelSnapshot, metric: &dyn ScoreMetric, pass: usize) -> Result<StrategyScores> {
        let n = snapshot.len();
        let all: Vec<usize> = (0..n).collect();
        let mut degraded = false;
        let shapes = self.recover(snapshot.shape_matrix(&all), "shapes", &mut degraded);
        let textures = self.recover(snapshot.texture_matrix(&all), "textures", &mut degraded);

        let model = AppearanceModel::from_matrices(&shapes, &textures, self.retained).ok_or(
            AamError::TooFewSamples {
                iteration: pass,
                needed: 1,
                found: n,
            },
        )?;

        let evaluations = (0..n)
            .into_par_iter()
            .map(|pos| {
                let evaluation = metric.evaluate(snapshot, pos, &model);
                debug!("sample {}: score {:.6}", snapshot.active()[pos], evaluation.score);
                evaluation
            })
            .collect();

        Ok(StrategyScores {
            evaluations,
            degraded,
        })
    }
}

/// The strategy selected by `config`.
pub fn strategy_for(config: &AamConfig) -> Box<dyn OutlierStrategy> {
    match config.strategy {
        Strategy::LeaveOneOut => Box::new(LeaveOneOutStrategy::new(config.variance_retained)),
        Strategy::RobustPca => Box::new(RobustPcaStrategy::new(
            config.variance_retained,
            config.rpca.clone(),
        )),
    }
}

/// Population statistics of one pass's scores and the resulting cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Scores at or above this value are outliers; `None` when the scores
    /// are too tightly packed to single anything out.
    pub threshold: Option<f64>,
}

impl ScoreStats {
    pub fn compute(scores: &[f64], sigma: f64, min_spread: f64) -> Self {
        if scores.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                threshold: None,
            };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std_dev = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        let threshold = (std_dev > min_spread).then(|| mean + sigma * std_dev);
        Self {
            mean,
            std_dev,
            threshold,
        }
    }

    pub fn is_outlier(&self, score: f64) -> bool {
        self.threshold.map_or(false, |t| score >= t)
    }
}

/// What one detection pass saw and decided.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass: usize,
    /// Dataset indices scored in this pass.
    pub active: Vec<usize>,
    /// Scores in the order of `active`.
    pub scores: Vec<f64>,
    pub stats: ScoreStats,
    /// Dataset indices flagged in this pass.
    pub flagged: Vec<usize>,
    pub degraded: bool,
}

/// Outcome of a detector run.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub strategy: Strategy,
    pub metric: Metric,
    pub inliers: Vec<usize>,
    pub outliers: Vec<usize>,
    pub passes: Vec<PassReport>,
}

/// Drops the `flagged` samples from `active`.
///
/// A pass may never empty the active subset. With population statistics and
/// a non-negative sigma the lowest score always stays below the threshold,
/// so this only fires for inconsistent input.
fn remove_flagged(active: &mut Vec<usize>, flagged: &[usize], pass: usize) -> Result<()> {
    if active.iter().all(|i| flagged.contains(i)) {
        return Err(AamError::EmptyActiveSubset { iteration: pass });
    }
    active.retain(|i| !flagged.contains(i));
    Ok(())
}

/// Sink used when the caller asked for no diagnostics.
struct Discard;

impl DiagnosticsSink for Discard {
    fn begin_pass(&mut self, _pass: usize) -> Result<()> {
        Ok(())
    }

    fn record(&mut self, _sample: usize, _verdict: Verdict, _diagnostics: SampleDiagnostics) -> Result<()> {
        Ok(())
    }
}

/// Iterative outlier removal over a fixed dataset.
pub struct OutlierDetector {
    dataset: Dataset,
    config: AamConfig,
    strategy: Box<dyn OutlierStrategy>,
    metric: Box<dyn ScoreMetric>,
}

impl OutlierDetector {
    pub fn new(dataset: Dataset, config: AamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            strategy: strategy_for(&config),
            metric: scorer_for(config.metric),
            dataset,
            config,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &AamConfig {
        &self.config
    }

    /// Replaces the configuration together with the strategy and scorer it
    /// selects. On error the detector is left unchanged.
    pub fn reconfigure(&mut self, config: AamConfig) -> Result<()> {
        config.validate()?;
        self.strategy = strategy_for(&config);
        self.metric = scorer_for(config.metric);
        self.config = config;
        Ok(())
    }

    /// Removes outliers pass by pass until a pass flags nothing.
    pub fn find_inliers(&self) -> Result<DetectionReport> {
        self.run_iterative(&mut Discard, false)
    }

    /// Like [`find_inliers`](Self::find_inliers), reporting per-sample
    /// diagnostics to `sink` when `collect_diagnostics` is set.
    pub fn find_inliers_with(&self, sink: &mut dyn DiagnosticsSink) -> Result<DetectionReport> {
        self.run_iterative(sink, self.config.collect_diagnostics)
    }

    /// Runs a single pass over every sample with the inspection threshold.
    /// Flagged samples are reported but nothing is iterated.
    pub fn inspect(&self) -> Result<DetectionReport> {
        self.run_inspection(&mut Discard, false)
    }

    pub fn inspect_with(&self, sink: &mut dyn DiagnosticsSink) -> Result<DetectionReport> {
        self.run_inspection(sink, self.config.collect_diagnostics)
    }

    fn run_iterative(&self, sink: &mut dyn DiagnosticsSink, render: bool) -> Result<DetectionReport> {
        let mut active: Vec<usize> = (0..self.dataset.len()).collect();
        let mut outliers = Vec::new();
        let mut passes = Vec::new();

        loop {
            let pass = passes.len();
            let sigma = self.config.iterative_sigma;
            let report = self.run_pass(&active, pass, sigma, &mut *sink, render)?;
            let flagged = report.flagged.clone();
            passes.push(report);
            if flagged.is_empty() {
                break;
            }
            remove_flagged(&mut active, &flagged, pass)?;
            outliers.extend(flagged);
        }

        outliers.sort_unstable();
        info!(
            "{} inliers, {} outliers after {} passes",
            active.len(),
            outliers.len(),
            passes.len()
        );
        Ok(DetectionReport {
            strategy: self.strategy.strategy(),
            metric: self.metric.metric(),
            inliers: active,
            outliers,
            passes,
        })
    }

    fn run_inspection(&self, sink: &mut dyn DiagnosticsSink, render: bool) -> Result<DetectionReport> {
        let active: Vec<usize> = (0..self.dataset.len()).collect();
        let report = self.run_pass(&active, 0, self.config.inspection_sigma, sink, render)?;
        let inliers = active
            .iter()
            .copied()
            .filter(|i| !report.flagged.contains(i))
            .collect();
        Ok(DetectionReport {
            strategy: self.strategy.strategy(),
            metric: self.metric.metric(),
            inliers,
            outliers: report.flagged.clone(),
            passes: vec![report],
        })
    }

    /// Builds a fresh snapshot of `active`, scores it and applies the
    /// threshold. Diagnostics are only rendered once the pass is known to
    /// leave at least one inlier.
    fn run_pass(
        &self,
        active: &[usize],
        pass: usize,
        sigma: f64,
        sink: &mut dyn DiagnosticsSink,
        render: bool,
    ) -> Result<PassReport> {
        let snapshot = ModelSnapshot::build(&self.dataset, active, &self.config)?;
        let scored = self.strategy.score(&snapshot, self.metric.as_ref(), pass)?;

        let scores: Vec<f64> = scored.evaluations.iter().map(|e| e.score).collect();
        let stats = ScoreStats::compute(&scores, sigma, self.config.min_score_spread);
        let verdicts: Vec<Verdict> = scores
            .iter()
            .map(|&s| {
                if stats.is_outlier(s) {
                    Verdict::Outlier
                } else {
                    Verdict::Inlier
                }
            })
            .collect();
        let flagged: Vec<usize> = active
            .iter()
            .zip(&verdicts)
            .filter(|(_, v)| **v == Verdict::Outlier)
            .map(|(&i, _)| i)
            .collect();

        info!(
            "pass {pass}: {} samples, mean {:.6}, std {:.6}, {} flagged",
            active.len(),
            stats.mean,
            stats.std_dev,
            flagged.len()
        );
        for &i in &flagged {
            info!("outlier: {i}");
        }

        if render && flagged.len() < active.len() {
            sink.begin_pass(pass)?;
            let metric = self.metric.metric();
            for (pos, (evaluation, verdict)) in scored.evaluations.iter().zip(&verdicts).enumerate() {
                let diagnostics =
                    SampleDiagnostics::render(&snapshot, pos, &evaluation.reconstruction, metric);
                sink.record(active[pos], *verdict, diagnostics)?;
            }
        }

        Ok(PassReport {
            pass,
            active: active.to_vec(),
            scores,
            stats,
            flagged,
            degraded: scored.degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_uses_population_statistics() {
        let scores = [1.0, 1.0, 1.0, 1.0, 5.0];
        let stats = ScoreStats::compute(&scores, 1.5, 1e-9);
        assert!((stats.mean - 1.8).abs() < 1e-12);
        assert!((stats.std_dev - 1.6).abs() < 1e-12);
        assert!(stats.is_outlier(5.0));
        assert!(!stats.is_outlier(1.0));

        // a score sitting exactly on the threshold counts
        let stats = ScoreStats::compute(&[0.0, 2.0], 1.0, 1e-9);
        assert_eq!(stats.threshold, Some(2.0));
        assert!(stats.is_outlier(2.0));
    }

    #[test]
    fn packed_scores_flag_nothing() {
        let stats = ScoreStats::compute(&[0.0; 6], 2.0, 1e-9);
        assert_eq!(stats.threshold, None);
        assert!(!stats.is_outlier(0.0));

        let stats = ScoreStats::compute(&[1e-15, 2e-15, 0.0], 0.0, 1e-9);
        assert!(!stats.is_outlier(2e-15));
        assert!(ScoreStats::compute(&[], 2.0, 1e-9).threshold.is_none());
    }

    #[test]
    fn lowest_score_is_never_flagged() {
        let scores = [0.4, 0.4, 0.41, 3.0, 3.0];
        for sigma in [0.0, 0.5, 2.0] {
            let stats = ScoreStats::compute(&scores, sigma, 1e-9);
            assert!(!stats.is_outlier(0.4), "sigma {sigma}");
        }
    }

    #[test]
    fn removing_every_active_sample_is_an_error() {
        let mut active = vec![2, 5, 7];
        remove_flagged(&mut active, &[5], 0).unwrap();
        assert_eq!(active, vec![2, 7]);

        let err = remove_flagged(&mut active, &[7, 2], 3).unwrap_err();
        assert_eq!(err, AamError::EmptyActiveSubset { iteration: 3 });
        assert_eq!(active, vec![2, 7]);
    }

    #[test]
    fn strategy_follows_config() {
        let config = AamConfig {
            strategy: Strategy::RobustPca,
            ..AamConfig::default()
        };
        assert_eq!(strategy_for(&config).strategy(), Strategy::RobustPca);
        assert_eq!(strategy_for(&AamConfig::default()).strategy(), Strategy::LeaveOneOut);
    }
}
