use aamfilter::{AamConfig, Dataset, Photo, Point, Sample, Shape, Triangulation};

pub const IMAGE_SIZE: usize = 100;

/// Landmark order of the shuffled sample: every row of the grid is rotated by
/// one column, which keeps all triangles non-degenerate.
pub const SHUFFLE: [usize; 9] = [2, 0, 1, 5, 3, 4, 8, 6, 7];

/// Integer landmark offsets of the well-aligned samples.
const OFFSETS: [(i32, i32); 10] = [
    (0, 0),
    (3, -2),
    (-4, 1),
    (2, 5),
    (-1, -5),
    (5, 3),
    (-3, -3),
    (1, 2),
    (4, -4),
    (-5, 4),
];

/// Gain and offset of the well-aligned samples.
const LIGHTING: [(f64, f64); 10] = [
    (1.0, 0.0),
    (0.9, 0.03),
    (1.08, -0.02),
    (0.85, 0.05),
    (0.95, 0.0),
    (1.05, -0.04),
    (0.88, 0.02),
    (1.02, 0.01),
    (0.92, -0.01),
    (0.97, 0.04),
];

/// Smooth asymmetric colour pattern in face-local coordinates.
fn pattern(u: f64, v: f64) -> [f64; 3] {
    [
        0.5 + 0.25 * (u / 6.0).sin() + 0.001 * u,
        0.5 + 0.25 * (v / 5.0 + u / 17.0).cos(),
        0.4 + 0.2 * ((u - 2.0 * v) / 9.0).sin(),
    ]
}

/// A 3x3 landmark grid shifted by `(dx, dy)`.
pub fn grid_shape(dx: i32, dy: i32) -> Shape {
    let mut points = Vec::with_capacity(9);
    for r in 0..3 {
        for c in 0..3 {
            points.push(Point::new(
                (20 + 25 * c + dx) as f64,
                (20 + 25 * r + dy) as f64,
            ));
        }
    }
    Shape::from_points(&points)
}

/// Two triangles per grid cell.
pub fn grid_triangulation() -> Triangulation {
    let mut triangles = Vec::new();
    for r in 0..2 {
        for c in 0..2 {
            let i = 3 * r + c;
            triangles.push([i, i + 1, i + 3]);
            triangles.push([i + 1, i + 4, i + 3]);
        }
    }
    Triangulation::new(triangles)
}

/// The pattern drawn relative to the landmark grid at `(dx, dy)`.
pub fn grid_image(dx: i32, dy: i32, gain: f64, offset: f64) -> Photo {
    Photo::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
        let rgb = pattern(x as f64 - dx as f64, y as f64 - dy as f64);
        rgb.map(|c| gain * c + offset)
    })
}

/// Ten well-aligned samples. With `varied_lighting` each one gets its own
/// gain and offset.
pub fn clean_samples(varied_lighting: bool) -> Vec<Sample> {
    OFFSETS
        .iter()
        .zip(LIGHTING.iter())
        .map(|(&(dx, dy), &(gain, offset))| {
            let (gain, offset) = if varied_lighting { (gain, offset) } else { (1.0, 0.0) };
            Sample::new(grid_image(dx, dy, gain, offset), grid_shape(dx, dy))
        })
        .collect()
}

/// The first clean sample with its landmarks listed in the wrong order.
pub fn shuffled_sample() -> Sample {
    let (dx, dy) = OFFSETS[0];
    let good = grid_shape(dx, dy);
    let points: Vec<Point> = SHUFFLE.iter().map(|&k| good.point(k)).collect();
    Sample::new(grid_image(dx, dy, 1.0, 0.0), Shape::from_points(&points))
}

/// Ten clean samples followed by the shuffled one at index 10.
pub fn dataset_with_shuffled(varied_lighting: bool) -> Dataset {
    let mut samples = clean_samples(varied_lighting);
    samples.push(shuffled_sample());
    Dataset::new(samples, grid_triangulation()).unwrap()
}

/// `count` copies of the same sample.
pub fn identical_dataset(count: usize) -> Dataset {
    let samples = (0..count)
        .map(|_| Sample::new(grid_image(0, 0, 1.0, 0.0), grid_shape(0, 0)))
        .collect();
    Dataset::new(samples, grid_triangulation()).unwrap()
}

/// Small canonical frame to keep the tests fast.
pub fn test_config() -> AamConfig {
    AamConfig {
        target_shape_size: 60.0,
        ..AamConfig::default()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
