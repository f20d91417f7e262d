use nalgebra::{Matrix2, Vector2};

use crate::shape::Point;

/// Relative determinant below which three vertices are treated as collinear.
const DEGENERATE_EPS: f64 = 1e-10;

/// Represents a 2D affine transformation. It includes:
/// - A 2×2 linear transform matrix (`a11`, `a12`, `a21`, `a22`).
/// - A translation offset (`translate_x`, `translate_y`).
///
/// A point `(x, y)` is transformed into `(X, Y)` by:
///
/// ```text
///   X = (x * a11) + (y * a12) + translate_x;
///   Y = (x * a21) + (y * a22) + translate_y;
/// ```
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AffineTransform {
    /// Translation offset in the transformed space (x-direction).
    pub translate_x: f64,

    /// Translation offset in the transformed space (y-direction).
    pub translate_y: f64,

    /// Matrix entry: row 1, col 1.
    pub a11: f64,

    /// Matrix entry: row 1, col 2.
    pub a12: f64,

    /// Matrix entry: row 2, col 1.
    pub a21: f64,

    /// Matrix entry: row 2, col 2.
    pub a22: f64,
}

impl AffineTransform {
    /// The transform that leaves every point where it is.
    pub fn identity() -> Self {
        AffineTransform {
            translate_x: 0.0,
            translate_y: 0.0,
            a11: 1.0,
            a12: 0.0,
            a21: 0.0,
            a22: 1.0,
        }
    }

    fn linear(&self) -> Matrix2<f64> {
        Matrix2::new(self.a11, self.a12, self.a21, self.a22)
    }

    fn from_linear(m: Matrix2<f64>, t: Vector2<f64>) -> Self {
        AffineTransform {
            translate_x: t.x,
            translate_y: t.y,
            a11: m[(0, 0)],
            a12: m[(0, 1)],
            a21: m[(1, 0)],
            a22: m[(1, 1)],
        }
    }

    /// Computes the unique affine map sending the three `src` vertices onto the
    /// three `dst` vertices.
    ///
    /// Three non-collinear correspondences determine an affine map exactly, so
    /// there is no fitting involved. Returns `None` if the source vertices are
    /// collinear (or coincide), in which case no such map exists.
    ///
    /// # Examples
    /// ```
    /// # use aamfilter::affine_transform::AffineTransform;
    /// # use aamfilter::shape::Point;
    /// let src = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
    /// let dst = [Point::new(10.0, 10.0), Point::new(12.0, 10.0), Point::new(10.0, 13.0)];
    /// let t = AffineTransform::from_triangles(&src, &dst).unwrap();
    /// assert_eq!(t.transform(1.0, 1.0), (12.0, 13.0));
    ///
    /// let collinear = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
    /// assert!(AffineTransform::from_triangles(&collinear, &dst).is_none());
    /// ```
    pub fn from_triangles(src: &[Point; 3], dst: &[Point; 3]) -> Option<AffineTransform> {
        let s0 = Vector2::new(src[0].x, src[0].y);
        let e1 = Vector2::new(src[1].x, src[1].y) - s0;
        let e2 = Vector2::new(src[2].x, src[2].y) - s0;
        let d0 = Vector2::new(dst[0].x, dst[0].y);
        let f1 = Vector2::new(dst[1].x, dst[1].y) - d0;
        let f2 = Vector2::new(dst[2].x, dst[2].y) - d0;

        let m_src = Matrix2::from_columns(&[e1, e2]);
        let m_dst = Matrix2::from_columns(&[f1, f2]);

        let det = m_src.determinant();
        let extent = e1.norm_squared().max(e2.norm_squared());
        if !det.is_finite() || det.abs() <= DEGENERATE_EPS * extent.max(f64::MIN_POSITIVE) {
            return None;
        }

        let m_src_inv = m_src.try_inverse()?;
        let a = m_dst * m_src_inv;
        let t = d0 - a * s0;
        Some(Self::from_linear(a, t))
    }

    /// The inverse map, or `None` if the linear part is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let inv = self.linear().try_inverse()?;
        let t = -(inv * Vector2::new(self.translate_x, self.translate_y));
        Some(Self::from_linear(inv, t))
    }

    /// Composition that applies `self` first, then `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        let m = next.linear() * self.linear();
        let t = next.linear() * Vector2::new(self.translate_x, self.translate_y)
            + Vector2::new(next.translate_x, next.translate_y);
        Self::from_linear(m, t)
    }

    /// Transform a point (x, y) according to this affine transform.
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let tx = self.a11 * x + self.a12 * y + self.translate_x;
        let ty = self.a21 * x + self.a22 * y + self.translate_y;
        (tx, ty)
    }

    pub fn transform_point(&self, p: Point) -> Point {
        let (x, y) = self.transform(p.x, p.y);
        Point::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn maps_triangle_vertices_exactly() {
        let src = [Point::new(12.5, 3.0), Point::new(40.0, 18.0), Point::new(7.0, 33.0)];
        let dst = [Point::new(100.0, 90.0), Point::new(150.0, 80.0), Point::new(95.0, 160.0)];
        let t = AffineTransform::from_triangles(&src, &dst).unwrap();
        for k in 0..3 {
            assert!(close(t.transform_point(src[k]), dst[k]));
        }
    }

    #[test]
    fn inverse_undoes_forward_on_vertices() {
        let src = [Point::new(0.0, 0.0), Point::new(30.0, 4.0), Point::new(-5.0, 22.0)];
        let dst = [Point::new(7.0, 9.0), Point::new(60.0, 1.0), Point::new(3.0, 70.0)];
        let forward = AffineTransform::from_triangles(&src, &dst).unwrap();
        let backward = forward.inverse().unwrap();

        let round_trip = forward.then(&backward);
        for v in src {
            assert!(close(round_trip.transform_point(v), v));
            assert!(close(backward.transform_point(forward.transform_point(v)), v));
        }
        let id = AffineTransform::identity();
        assert!((round_trip.a11 - id.a11).abs() < 1e-12);
        assert!(round_trip.a12.abs() < 1e-12);
        assert!(round_trip.translate_x.abs() < 1e-9);
    }

    #[test]
    fn coincident_vertices_are_degenerate() {
        let p = Point::new(3.0, 3.0);
        let dst = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert!(AffineTransform::from_triangles(&[p, p, p], &dst).is_none());
    }

    #[test]
    fn singular_linear_part_has_no_inverse() {
        let t = AffineTransform {
            a11: 1.0,
            a12: 2.0,
            a21: 2.0,
            a22: 4.0,
            ..AffineTransform::identity()
        };
        assert!(t.inverse().is_none());
    }
}
