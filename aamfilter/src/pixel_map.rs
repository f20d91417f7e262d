use crate::shape::{Point, Shape, Triangulation};

/// Per-pixel assignment of the mesh triangle that covers it.
///
/// Triangles are rasterised in declaration order, so a pixel lying on an edge
/// shared by two triangles ends up owned by the one declared later.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMap {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Row-major triangle labels, `None` where no triangle covers the pixel.
    labels: Vec<Option<u32>>,
}

impl PixelMap {
    /// Rasterises `triangulation` with the vertex positions of `shape` onto a
    /// `width × height` grid. Pixel `(x, y)` is covered when the integer point
    /// `(x, y)` lies inside or on the boundary of a triangle. Collinear
    /// triangles cover nothing.
    pub fn rasterize(
        shape: &Shape,
        triangulation: &Triangulation,
        width: usize,
        height: usize,
    ) -> PixelMap {
        let mut map = PixelMap {
            width,
            height,
            labels: vec![None; width * height],
        };
        for t in 0..triangulation.len() {
            let verts = triangulation.vertices(t, shape);
            map.fill_triangle(&verts, t as u32);
        }
        map
    }

    fn fill_triangle(&mut self, v: &[Point; 3], label: u32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let area = edge(v[0], v[1], v[2]);
        if !area.is_finite() || area.abs() < 1e-12 {
            return;
        }
        let eps = 1e-9 * area.abs();

        let min_x = v.iter().map(|p| p.x).fold(f64::INFINITY, f64::min).ceil().max(0.0);
        let max_x = v
            .iter()
            .map(|p| p.x)
            .fold(f64::NEG_INFINITY, f64::max)
            .floor()
            .min(self.width as f64 - 1.0);
        let min_y = v.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).ceil().max(0.0);
        let max_y = v
            .iter()
            .map(|p| p.y)
            .fold(f64::NEG_INFINITY, f64::max)
            .floor()
            .min(self.height as f64 - 1.0);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let sign = area.signum();
        for y in (min_y as usize)..=(max_y as usize) {
            for x in (min_x as usize)..=(max_x as usize) {
                let p = Point::new(x as f64, y as f64);
                let w0 = edge(v[1], v[2], p) * sign;
                let w1 = edge(v[2], v[0], p) * sign;
                let w2 = edge(v[0], v[1], p) * sign;
                if w0 >= -eps && w1 >= -eps && w2 >= -eps {
                    self.labels[y * self.width + x] = Some(label);
                }
            }
        }
    }

    /// Triangle covering `(x, y)`, if any.
    pub fn label(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            None
        } else {
            self.labels[y * self.width + x]
        }
    }

    /// Number of covered pixels.
    pub fn covered(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }

    /// Groups the covered pixel coordinates by triangle, each group in
    /// row-major scan order.
    pub fn triangle_pixels(&self, num_triangles: usize) -> TrianglePixels {
        let mut coords = vec![Vec::new(); num_triangles];
        for y in 0..self.height {
            for x in 0..self.width {
                if let Some(t) = self.labels[y * self.width + x] {
                    if let Some(group) = coords.get_mut(t as usize) {
                        group.push((x, y));
                    }
                }
            }
        }
        TrianglePixels::new(coords)
    }
}

/// Twice the signed area of triangle `(a, b, c)`.
fn edge(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Pixel coordinates grouped by the triangle that owns them.
///
/// Concatenating the groups in triangle order defines the texel order of a
/// texture vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TrianglePixels {
    coords: Vec<Vec<(usize, usize)>>,
    total: usize,
}

impl TrianglePixels {
    pub fn new(coords: Vec<Vec<(usize, usize)>>) -> Self {
        let total = coords.iter().map(Vec::len).sum();
        Self { coords, total }
    }

    /// Pixels owned by triangle `t`.
    pub fn of_triangle(&self, t: usize) -> &[(usize, usize)] {
        &self.coords[t]
    }

    pub fn num_triangles(&self) -> usize {
        self.coords.len()
    }

    /// Total pixel count over all triangles.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Every pixel in texel order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.coords.iter().flat_map(|g| g.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> (Shape, Triangulation) {
        let shape = Shape::from_points(&[
            Point::new(2.0, 2.0),
            Point::new(8.0, 2.0),
            Point::new(8.0, 8.0),
            Point::new(2.0, 8.0),
        ]);
        let tri = Triangulation::new(vec![[0, 1, 2], [0, 2, 3]]);
        (shape, tri)
    }

    #[test]
    fn rasterisation_is_idempotent() {
        let (shape, tri) = square();
        let a = PixelMap::rasterize(&shape, &tri, 12, 12);
        let b = PixelMap::rasterize(&shape, &tri, 12, 12);
        assert_eq!(a, b);
    }

    #[test]
    fn shared_diagonal_belongs_to_later_triangle() {
        let (shape, tri) = square();
        let map = PixelMap::rasterize(&shape, &tri, 12, 12);
        // the diagonal x == y is shared by both triangles
        for k in 2..=8 {
            assert_eq!(map.label(k, k), Some(1));
        }
        assert_eq!(map.label(7, 3), Some(0));
        assert_eq!(map.label(3, 7), Some(1));
        assert_eq!(map.label(1, 1), None);
        assert_eq!(map.label(9, 5), None);
        // a 7x7 block of lattice points
        assert_eq!(map.covered(), 49);
    }

    #[test]
    fn every_covered_pixel_is_counted_once() {
        let (shape, tri) = square();
        let map = PixelMap::rasterize(&shape, &tri, 12, 12);
        let pixels = map.triangle_pixels(tri.len());
        assert_eq!(pixels.total(), map.covered());
        let mut seen: Vec<_> = pixels.iter().collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), pixels.total());
        assert_eq!(pixels.of_triangle(0).len() + pixels.of_triangle(1).len(), 49);
    }

    #[test]
    fn collinear_triangle_covers_nothing() {
        let shape = Shape::from_points(&[
            Point::new(1.0, 1.0),
            Point::new(3.0, 3.0),
            Point::new(5.0, 5.0),
        ]);
        let tri = Triangulation::new(vec![[0, 1, 2]]);
        let map = PixelMap::rasterize(&shape, &tri, 8, 8);
        assert_eq!(map.covered(), 0);
        assert_eq!(map.triangle_pixels(1).of_triangle(0).len(), 0);
    }

    #[test]
    fn triangles_are_clipped_to_the_canvas() {
        let shape = Shape::from_points(&[
            Point::new(-5.0, -5.0),
            Point::new(20.0, -5.0),
            Point::new(-5.0, 20.0),
        ]);
        let tri = Triangulation::new(vec![[0, 1, 2]]);
        let map = PixelMap::rasterize(&shape, &tri, 4, 4);
        assert_eq!(map.covered(), 16);
    }
}
