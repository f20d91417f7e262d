use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use aamfilter::{
    AamConfig, AamError, Dataset, DetectionReport, DiagnosticsSink, Metric, OutlierDetector,
    Photo, Point, Sample, SampleDiagnostics, Shape, Strategy, Triangulation, Verdict,
};
use clap::{Parser, ValueEnum};
use image::open;
use log::info;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Finds images whose landmarks or pixels do not fit the rest of a face dataset.")]
struct Args {
    /// Settings file listing one "image landmarks" pair per line, relative to the file itself
    #[arg()]
    settings_file: PathBuf,

    /// Triangulation file: one triangle per line, three 1-based landmark indices
    #[arg(long)]
    triangulation: PathBuf,

    /// Directory receiving inliers/, outliers/ and report.json
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Optional JSON file with an AamConfig. Defaults are used for missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the score metric of the config
    #[arg(long, value_enum)]
    metric: Option<MetricArg>,

    /// Overrides the detection strategy of the config
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Run a single inspection pass instead of iterating to a fixed point
    #[arg(long)]
    one_shot: bool,

    /// Skip rendering the per-sample diagnostic images
    #[arg(long)]
    no_diagnostics: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MetricArg {
    Texture,
    Fitting,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    LeaveOneOut,
    Rpca,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let dataset = load_dataset(&args.settings_file, &args.triangulation)?;
    info!("loaded {} samples", dataset.len());

    let mut sink = DirectorySink::create(&args.output_dir)?;
    let detector = OutlierDetector::new(dataset, config)?;
    let report = if args.one_shot {
        detector.inspect_with(&mut sink)?
    } else {
        detector.find_inliers_with(&mut sink)?
    };

    write_report(&report, &args.output_dir.join("report.json"))?;
    println!("inliers: {:?}", report.inliers);
    println!("outliers: {:?}", report.outliers);
    println!("Done.");
    Ok(())
}

fn load_config(args: &Args) -> Result<AamConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => AamConfig::default(),
    };
    if let Some(metric) = args.metric {
        config.metric = match metric {
            MetricArg::Texture => Metric::TextureError,
            MetricArg::Fitting => Metric::FittingError,
        };
    }
    if let Some(strategy) = args.strategy {
        config.strategy = match strategy {
            StrategyArg::LeaveOneOut => Strategy::LeaveOneOut,
            StrategyArg::Rpca => Strategy::RobustPca,
        };
    }
    if args.no_diagnostics {
        config.collect_diagnostics = false;
    }
    Ok(config)
}

fn load_dataset(settings_file: &Path, triangulation_file: &Path) -> Result<Dataset, Box<dyn Error>> {
    let base = settings_file.parent().unwrap_or_else(|| Path::new(""));
    let pairs = parse_settings(&fs::read_to_string(settings_file)?, base)?;

    let mut samples = Vec::with_capacity(pairs.len());
    for (image_file, points_file) in pairs {
        info!("[{}, {}]", image_file.display(), points_file.display());
        let image = read_photo(&image_file)?;
        let shape = parse_points(&fs::read_to_string(&points_file)?)
            .map_err(|e| format!("{}: {e}", points_file.display()))?;
        samples.push(Sample::new(image, shape));
    }

    let triangulation = parse_triangulation(&fs::read_to_string(triangulation_file)?)?;
    Ok(Dataset::new(samples, triangulation)?)
}

/// Non-empty, non-comment lines of `text` as `(image, landmarks)` paths under `base`.
fn parse_settings(text: &str, base: &Path) -> Result<Vec<(PathBuf, PathBuf)>, Box<dyn Error>> {
    let mut pairs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [image, points] => pairs.push((base.join(image), base.join(points))),
            _ => return Err(format!("settings line {}: expected two file names", lineno + 1).into()),
        }
    }
    Ok(pairs)
}

/// Reads landmarks either from bare "x y" lines or from the `.pts` layout
/// (`version`/`n_points` header, coordinates between braces).
fn parse_points(text: &str) -> Result<Shape, Box<dyn Error>> {
    let mut points = Vec::new();
    let mut expected = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == "{" || line == "}" || line.starts_with("version") {
            continue;
        }
        if let Some(n) = line.strip_prefix("n_points:") {
            expected = Some(n.trim().parse::<usize>()?);
            continue;
        }
        let coords: Vec<f64> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()?;
        match coords.as_slice() {
            [x, y] => points.push(Point::new(*x, *y)),
            _ => return Err(format!("malformed landmark line {line:?}").into()),
        }
    }
    if let Some(n) = expected {
        if n != points.len() {
            return Err(format!("header announces {n} points, found {}", points.len()).into());
        }
    }
    Ok(Shape::from_points(&points))
}

fn parse_triangulation(text: &str) -> Result<Triangulation, Box<dyn Error>> {
    let mut triangles = Vec::new();
    for line in text.lines() {
        let idx: Vec<usize> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()?;
        match idx.as_slice() {
            [] => continue,
            [a, b, c] => triangles.push([*a, *b, *c]),
            _ => return Err(format!("malformed triangle line {line:?}").into()),
        }
    }
    Ok(Triangulation::from_one_based(triangles)?)
}

fn write_report(report: &DetectionReport, path: &Path) -> Result<(), Box<dyn Error>> {
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    println!("Report written to {}", path.display());
    Ok(())
}

/// Writes diagnostics as JPEG files under `inliers/` and `outliers/`.
struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Starts from empty `inliers/` and `outliers/` directories.
    fn create(root: &Path) -> Result<Self, AamError> {
        let sink = Self {
            root: root.to_path_buf(),
        };
        sink.recreate("outliers")?;
        sink.recreate("inliers")?;
        Ok(sink)
    }

    fn recreate(&self, name: &str) -> Result<(), AamError> {
        let dir = self.root.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(sink_error)?;
        }
        fs::create_dir_all(&dir).map_err(sink_error)
    }
}

impl DiagnosticsSink for DirectorySink {
    fn begin_pass(&mut self, _pass: usize) -> Result<(), AamError> {
        // inliers of the previous pass are rescored
        self.recreate("inliers")
    }

    fn record(&mut self, sample: usize, verdict: Verdict, diagnostics: SampleDiagnostics) -> Result<(), AamError> {
        let dir = self.root.join(match verdict {
            Verdict::Inlier => "inliers",
            Verdict::Outlier => "outliers",
        });
        let stem = format!("image{sample}");
        save_photo(&diagnostics.annotated, &dir.join(format!("{stem}.jpg")))?;
        if let Some(fitted) = &diagnostics.fitted {
            save_photo(fitted, &dir.join(format!("{stem}_fitted.jpg")))?;
        }
        save_photo(
            &diagnostics.reconstructed_texture,
            &dir.join(format!("{stem}_fitted_tex.jpg")),
        )?;
        save_photo(&diagnostics.warped_reference, &dir.join(format!("{stem}_warped.jpg")))
    }
}

fn sink_error(e: impl std::fmt::Display) -> AamError {
    AamError::DiagnosticsSink(e.to_string())
}

pub fn save_photo(photo: &Photo, filename: &Path) -> Result<(), AamError> {
    let img = image::RgbImage::from_raw(photo.width as u32, photo.height as u32, photo.to_rgb8())
        .ok_or_else(|| sink_error(format!("{}: pixel buffer size mismatch", filename.display())))?;
    img.save(filename).map_err(sink_error)
}

pub fn read_photo(filename: &Path) -> Result<Photo, Box<dyn Error>> {
    let img = open(filename).map_err(|e| format!("{}: {e}", filename.display()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Photo::from_rgba8(rgba.as_raw(), width as usize, height as usize))
}
