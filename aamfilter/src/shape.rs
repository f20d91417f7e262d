use serde::{Deserialize, Serialize};

use crate::error::{AamError, Result};

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An ordered set of landmarks stored flat as `[x0, y0, x1, y1, ...]`.
///
/// Landmark `i` refers to the same anatomical location in every sample of a
/// dataset, so shapes can be averaged and compared coordinate by coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    coords: Vec<f64>,
}

impl Shape {
    /// Wraps the flat coordinate vector of dataset sample `sample`. Fails if
    /// its length is odd.
    pub fn from_flat(sample: usize, coords: Vec<f64>) -> Result<Self> {
        if coords.len() % 2 != 0 {
            return Err(AamError::OddShapeLength {
                sample,
                len: coords.len(),
            });
        }
        Ok(Self { coords })
    }

    pub fn from_points(points: &[Point]) -> Self {
        let mut coords = Vec::with_capacity(points.len() * 2);
        for p in points {
            coords.push(p.x);
            coords.push(p.y);
        }
        Self { coords }
    }

    pub fn zeros(num_points: usize) -> Self {
        Self {
            coords: vec![0.0; num_points * 2],
        }
    }

    pub fn num_points(&self) -> usize {
        self.coords.len() / 2
    }

    pub fn point(&self, idx: usize) -> Point {
        Point::new(self.coords[idx * 2], self.coords[idx * 2 + 1])
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.coords
            .chunks_exact(2)
            .map(|c| Point::new(c[0], c[1]))
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.coords
    }

    /// Euclidean norm of the coordinate-wise difference between two shapes.
    pub fn distance(&self, other: &Shape) -> f64 {
        debug_assert_eq!(self.coords.len(), other.coords.len());
        self.coords
            .iter()
            .zip(other.coords.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in self.points() {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        (min_x, min_y, max_x, max_y)
    }

    /// Rescales the shape into a `size × size` frame: the bounding box is
    /// centred at `size / 2` and its longer side becomes `fill * size`.
    ///
    /// # Examples
    /// ```
    /// # use aamfilter::shape::{Point, Shape};
    /// let shape = Shape::from_points(&[Point::new(0.0, 0.0), Point::new(10.0, 5.0)]);
    /// let scaled = shape.scale_to_canonical(100.0, 1.0);
    /// assert_eq!(scaled.point(0), Point::new(0.0, 25.0));
    /// assert_eq!(scaled.point(1), Point::new(100.0, 75.0));
    /// ```
    pub fn scale_to_canonical(&self, size: f64, fill: f64) -> Shape {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        let center_x = 0.5 * (max_x + min_x);
        let center_y = 0.5 * (max_y + min_y);
        let range = (max_x - min_x).max(max_y - min_y);
        let factor = if range > 0.0 { fill * size / range } else { 1.0 };

        let coords = self
            .coords
            .chunks_exact(2)
            .flat_map(|c| {
                [
                    (c[0] - center_x) * factor + size * 0.5,
                    (c[1] - center_y) * factor + size * 0.5,
                ]
            })
            .collect();
        Shape { coords }
    }

    /// Arithmetic mean of equally sized shapes.
    pub fn mean<'a, I>(shapes: I) -> Option<Shape>
    where
        I: IntoIterator<Item = &'a Shape>,
    {
        let mut iter = shapes.into_iter();
        let first = iter.next()?;
        let mut sum = first.coords.clone();
        let mut count = 1usize;
        for s in iter {
            debug_assert_eq!(s.coords.len(), sum.len());
            for (acc, v) in sum.iter_mut().zip(s.coords.iter()) {
                *acc += v;
            }
            count += 1;
        }
        for v in &mut sum {
            *v /= count as f64;
        }
        Some(Shape { coords: sum })
    }
}

/// Fixed mesh connectivity over landmark indices, shared by every shape.
///
/// Triangle order matters: when triangles touch, pixels on the shared edge
/// belong to the triangle declared last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangulation {
    triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Creates a triangulation from 0-based vertex indices.
    pub fn new(triangles: Vec<[usize; 3]>) -> Self {
        Self { triangles }
    }

    /// Creates a triangulation from 1-based vertex indices, as stored in
    /// mesh files.
    ///
    /// # Examples
    /// ```
    /// # use aamfilter::shape::Triangulation;
    /// let tri = Triangulation::from_one_based(vec![[1, 2, 3]]).unwrap();
    /// assert_eq!(tri.triangles(), &[[0, 1, 2]]);
    /// assert!(Triangulation::from_one_based(vec![[0, 1, 2]]).is_err());
    /// ```
    pub fn from_one_based(triangles: Vec<[usize; 3]>) -> Result<Self> {
        let mut converted = Vec::with_capacity(triangles.len());
        for (t, tri) in triangles.into_iter().enumerate() {
            let mut out = [0usize; 3];
            for (k, idx) in tri.iter().enumerate() {
                out[k] = idx.checked_sub(1).ok_or(AamError::TriangleIndexOutOfRange {
                    triangle: t,
                    index: *idx,
                    num_points: 0,
                })?;
            }
            converted.push(out);
        }
        Ok(Self {
            triangles: converted,
        })
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Checks that every vertex index is below `num_points`.
    pub fn validate(&self, num_points: usize) -> Result<()> {
        if self.triangles.is_empty() {
            return Err(AamError::EmptyTriangulation);
        }
        for (t, tri) in self.triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i >= num_points) {
                return Err(AamError::TriangleIndexOutOfRange {
                    triangle: t,
                    index,
                    num_points,
                });
            }
        }
        Ok(())
    }

    /// Vertex positions of triangle `t` in `shape`.
    pub fn vertices(&self, t: usize, shape: &Shape) -> [Point; 3] {
        let [a, b, c] = self.triangles[t];
        [shape.point(a), shape.point(b), shape.point(c)]
    }
}
