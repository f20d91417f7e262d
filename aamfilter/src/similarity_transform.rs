use nalgebra::{Matrix2, Vector2};

use crate::shape::{Point, Shape};

/// A 2D similarity transform `q = scale * R * p + t`, with `R` a proper
/// rotation (no mirroring).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub scale: f64,
    pub rotation: Matrix2<f64>,
    pub translation: Vector2<f64>,
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: Matrix2::identity(),
            translation: Vector2::zeros(),
        }
    }

    /// Builds a transform from a scale, a rotation angle (radians) and a translation.
    pub fn from_parts(scale: f64, angle: f64, tx: f64, ty: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            scale,
            rotation: Matrix2::new(c, -s, s, c),
            translation: Vector2::new(tx, ty),
        }
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.rotation[(1, 0)].atan2(self.rotation[(0, 0)])
    }

    pub fn apply_point(&self, p: Point) -> Point {
        let q = self.rotation * Vector2::new(p.x, p.y) * self.scale + self.translation;
        Point::new(q.x, q.y)
    }

    pub fn apply_shape(&self, shape: &Shape) -> Shape {
        let points: Vec<Point> = shape.points().map(|p| self.apply_point(p)).collect();
        Shape::from_points(&points)
    }

    /// Least-squares similarity transform mapping `from` onto `to`.
    ///
    /// Uses the SVD of the cross-covariance of the centred point sets. When
    /// the covariance has a negative determinant the singular direction with
    /// the smallest singular value is flipped, so the result never mirrors.
    /// A source set with no spread yields a pure translation between centroids.
    ///
    /// # Examples
    /// ```
    /// # use aamfilter::shape::{Point, Shape};
    /// # use aamfilter::similarity_transform::SimilarityTransform;
    /// let from = Shape::from_points(&[Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)]);
    /// let to = SimilarityTransform::from_parts(2.0, 0.3, 5.0, -1.0).apply_shape(&from);
    /// let est = SimilarityTransform::estimate(&from, &to);
    /// assert!((est.scale - 2.0).abs() < 1e-9);
    /// assert!((est.angle() - 0.3).abs() < 1e-9);
    /// ```
    pub fn estimate(from: &Shape, to: &Shape) -> SimilarityTransform {
        debug_assert_eq!(from.num_points(), to.num_points());
        let n = from.num_points();
        if n == 0 {
            return Self::identity();
        }
        let nf = n as f64;

        let mu_p = from
            .points()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + Vector2::new(p.x, p.y))
            / nf;
        let mu_q = to
            .points()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + Vector2::new(p.x, p.y))
            / nf;

        let mut sig_p2 = 0.0;
        let mut sig_pq = Matrix2::zeros();
        for (p, q) in from.points().zip(to.points()) {
            let dp = Vector2::new(p.x, p.y) - mu_p;
            let dq = Vector2::new(q.x, q.y) - mu_q;
            sig_p2 += dp.norm_squared();
            sig_pq += dq * dp.transpose();
        }
        sig_p2 /= nf;
        sig_pq /= nf;

        if sig_p2 <= f64::EPSILON {
            return Self {
                scale: 1.0,
                rotation: Matrix2::identity(),
                translation: mu_q - mu_p,
            };
        }

        let svd = sig_pq.svd(true, true);
        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => {
                return Self {
                    scale: 1.0,
                    rotation: Matrix2::identity(),
                    translation: mu_q - mu_p,
                }
            }
        };
        let d = svd.singular_values;

        let mut signs = Vector2::new(1.0, 1.0);
        if (u * v_t).determinant() < 0.0 {
            let smallest = if d[0] <= d[1] { 0 } else { 1 };
            signs[smallest] = -1.0;
        }

        let rotation = u * Matrix2::from_diagonal(&signs) * v_t;
        let scale = (d[0] * signs[0] + d[1] * signs[1]) / sig_p2;
        let translation = mu_q - rotation * mu_p * scale;

        Self {
            scale,
            rotation,
            translation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn face_like_shape() -> Shape {
        Shape::from_points(&[
            Point::new(30.0, 40.0),
            Point::new(70.0, 42.0),
            Point::new(50.0, 60.0),
            Point::new(35.0, 80.0),
            Point::new(65.0, 78.0),
            Point::new(50.0, 95.0),
        ])
    }

    #[test]
    fn recovers_known_transforms_exactly() {
        let mut rng = StdRng::seed_from_u64(7);
        let from = face_like_shape();
        for _ in 0..50 {
            let scale = rng.gen_range(0.2..5.0);
            let angle = rng.gen_range(-3.0..3.0);
            let tx = rng.gen_range(-100.0..100.0);
            let ty = rng.gen_range(-100.0..100.0);
            let truth = SimilarityTransform::from_parts(scale, angle, tx, ty);
            let to = truth.apply_shape(&from);

            let est = SimilarityTransform::estimate(&from, &to);
            assert!((est.scale - scale).abs() < 1e-9, "scale {} vs {}", est.scale, scale);
            assert!((est.angle() - angle).abs() < 1e-9);
            assert!((est.translation.x - tx).abs() < 1e-7);
            assert!((est.translation.y - ty).abs() < 1e-7);
            assert!(est.apply_shape(&from).distance(&to) < 1e-7);
        }
    }

    #[test]
    fn mirrored_target_still_yields_a_proper_rotation() {
        let from = face_like_shape();
        let mirrored: Vec<Point> = from.points().map(|p| Point::new(-p.x, p.y)).collect();
        let to = Shape::from_points(&mirrored);
        let est = SimilarityTransform::estimate(&from, &to);
        assert!((est.rotation.determinant() - 1.0).abs() < 1e-9);
        assert!(est.scale > 0.0);
    }

    #[test]
    fn collapsed_source_maps_centroid_to_centroid() {
        let from = Shape::from_points(&[Point::new(1.0, 1.0), Point::new(1.0, 1.0)]);
        let to = Shape::from_points(&[Point::new(3.0, 4.0), Point::new(5.0, 6.0)]);
        let est = SimilarityTransform::estimate(&from, &to);
        assert_eq!(est.apply_point(Point::new(1.0, 1.0)), Point::new(4.0, 5.0));
    }
}
