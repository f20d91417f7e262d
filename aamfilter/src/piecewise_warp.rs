use nalgebra::DVector;

use crate::affine_transform::AffineTransform;
use crate::photo::Photo;
use crate::pixel_map::TrianglePixels;
use crate::shape::{Shape, Triangulation};

/// Per-triangle affine maps between one sample's shape and the mean shape.
///
/// A triangle whose vertices are collinear in either shape has no map in
/// either direction; it is skipped when warping.
#[derive(Debug, Clone)]
pub struct TriangleWarps {
    /// Sample image space to canonical (mean-shape) space.
    pub forward: Vec<Option<AffineTransform>>,
    /// Canonical space back to sample image space.
    pub inverse: Vec<Option<AffineTransform>>,
}

impl TriangleWarps {
    pub fn between(sample: &Shape, mean: &Shape, triangulation: &Triangulation) -> Self {
        let mut forward = Vec::with_capacity(triangulation.len());
        let mut inverse = Vec::with_capacity(triangulation.len());
        for t in 0..triangulation.len() {
            let src = triangulation.vertices(t, sample);
            let dst = triangulation.vertices(t, mean);
            let pair = AffineTransform::from_triangles(&src, &dst)
                .zip(AffineTransform::from_triangles(&dst, &src));
            match pair {
                Some((fwd, inv)) => {
                    forward.push(Some(fwd));
                    inverse.push(Some(inv));
                }
                None => {
                    forward.push(None);
                    inverse.push(None);
                }
            }
        }
        Self { forward, inverse }
    }

    /// Number of triangles without a valid map.
    pub fn skipped(&self) -> usize {
        self.forward.iter().filter(|t| t.is_none()).count()
    }
}

/// Resamples `image` into a new `width × height` photo.
///
/// Every target pixel listed in `target` under triangle `t` is mapped through
/// `transforms[t]` into `image` and sampled bilinearly. Pixels of triangles
/// without a transform, and pixels not listed at all, stay black.
pub fn warp(
    image: &Photo,
    transforms: &[Option<AffineTransform>],
    target: &TrianglePixels,
    width: usize,
    height: usize,
) -> Photo {
    let mut warped = Photo::new_black(width, height);
    for (t, transform) in transforms.iter().enumerate().take(target.num_triangles()) {
        let Some(transform) = transform else {
            continue;
        };
        for &(x, y) in target.of_triangle(t) {
            let (sx, sy) = transform.transform(x as f64, y as f64);
            warped.set_rgb(x, y, image.sample_bilinear(sx, sy));
        }
    }
    warped
}

/// Collects the pixels listed in `pixels` into a texture vector of
/// interleaved RGB values.
pub fn extract_texture(photo: &Photo, pixels: &TrianglePixels) -> DVector<f64> {
    let mut texture = DVector::zeros(pixels.total() * 3);
    for (k, (x, y)) in pixels.iter().enumerate() {
        let rgb = photo.get_rgb(x, y);
        texture[3 * k] = rgb[0];
        texture[3 * k + 1] = rgb[1];
        texture[3 * k + 2] = rgb[2];
    }
    texture
}

/// Writes a texture vector back onto a black `width × height` canvas.
pub fn fill_image(
    texture: &DVector<f64>,
    pixels: &TrianglePixels,
    width: usize,
    height: usize,
) -> Photo {
    debug_assert_eq!(texture.len(), pixels.total() * 3);
    let mut img = Photo::new_black(width, height);
    for (k, (x, y)) in pixels.iter().enumerate() {
        img.set_rgb(x, y, [texture[3 * k], texture[3 * k + 1], texture[3 * k + 2]]);
    }
    img
}

/// Root mean squared per-pixel colour difference over the listed pixels.
///
/// Each pixel contributes the squared Euclidean distance of its RGB triple.
pub fn rmse(a: &Photo, b: &Photo, pixels: &TrianglePixels) -> f64 {
    if pixels.total() == 0 {
        return 0.0;
    }
    let sum: f64 = pixels
        .iter()
        .map(|(x, y)| {
            let pa = a.get_rgb(x, y);
            let pb = b.get_rgb(x, y);
            (0..3).map(|c| (pa[c] - pb[c]).powi(2)).sum::<f64>()
        })
        .sum();
    (sum / pixels.total() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_map::PixelMap;
    use crate::shape::Point;

    fn pattern(w: usize, h: usize) -> Photo {
        Photo::from_fn(w, h, |x, y| {
            let (x, y) = (x as f64, y as f64);
            [
                0.5 + 0.4 * (x / 3.0).sin(),
                0.5 + 0.4 * (y / 4.0).cos(),
                0.5 + 0.3 * ((x + y) / 5.0).sin(),
            ]
        })
    }

    fn mesh() -> (Shape, Triangulation) {
        let shape = Shape::from_points(&[
            Point::new(3.0, 3.0),
            Point::new(16.0, 4.0),
            Point::new(15.0, 17.0),
            Point::new(4.0, 15.0),
        ]);
        (shape, Triangulation::new(vec![[0, 1, 2], [0, 2, 3]]))
    }

    #[test]
    fn identity_round_trip_reproduces_covered_pixels() {
        let (shape, tri) = mesh();
        let image = pattern(20, 20);
        let warps = TriangleWarps::between(&shape, &shape, &tri);
        assert_eq!(warps.skipped(), 0);

        let pixels = PixelMap::rasterize(&shape, &tri, 20, 20).triangle_pixels(tri.len());
        let to_texture = warp(&image, &warps.inverse, &pixels, 20, 20);
        let texture = extract_texture(&to_texture, &pixels);
        let canvas = fill_image(&texture, &pixels, 20, 20);
        let back = warp(&canvas, &warps.forward, &pixels, 20, 20);

        for (x, y) in pixels.iter() {
            let a = image.get_rgb(x, y);
            let b = back.get_rgb(x, y);
            for c in 0..3 {
                assert!((a[c] - b[c]).abs() < 1e-9, "pixel ({x}, {y})");
            }
        }
        assert!(rmse(&image, &back, &pixels) < 1e-9);
    }

    #[test]
    fn translated_sample_is_pulled_into_canonical_frame() {
        let (mean, tri) = mesh();
        let shifted: Vec<Point> = mean.points().map(|p| Point::new(p.x + 5.0, p.y + 2.0)).collect();
        let sample_shape = Shape::from_points(&shifted);
        let canonical = pattern(20, 20);
        let image = Photo::from_fn(30, 30, |x, y| {
            if x >= 5 && y >= 2 {
                canonical.get_rgb(x - 5, y - 2)
            } else {
                [0.0, 0.0, 0.0]
            }
        });

        let warps = TriangleWarps::between(&sample_shape, &mean, &tri);
        let pixels = PixelMap::rasterize(&mean, &tri, 20, 20).triangle_pixels(tri.len());
        let warped = warp(&image, &warps.inverse, &pixels, 20, 20);
        assert!(rmse(&warped, &canonical, &pixels) < 1e-9);
    }

    #[test]
    fn degenerate_triangles_contribute_no_texels() {
        let (mean, tri) = mesh();
        let collapsed = Shape::from_points(&[
            Point::new(3.0, 3.0),
            Point::new(16.0, 16.0),
            Point::new(9.0, 9.0),
            Point::new(4.0, 15.0),
        ]);
        let warps = TriangleWarps::between(&collapsed, &mean, &tri);
        assert_eq!(warps.skipped(), 1);
        assert!(warps.forward[0].is_none());
        assert!(warps.inverse[1].is_some());

        let pixels = PixelMap::rasterize(&mean, &tri, 20, 20).triangle_pixels(tri.len());
        let image = Photo::from_fn(20, 20, |_, _| [1.0, 1.0, 1.0]);
        let warped = warp(&image, &warps.inverse, &pixels, 20, 20);
        for &(x, y) in pixels.of_triangle(0) {
            assert_eq!(warped.get_rgb(x, y), [0.0, 0.0, 0.0]);
        }
    }
}
