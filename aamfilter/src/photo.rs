use crate::shape::Shape;

/// A basic representation of an image with floating-point RGB pixel data.
/// Each pixel occupies 3 consecutive values (R, G, B), each normally in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    /// Pixel data stored in a 1D `Vec<f64>`, row-major, 3 values per pixel.
    pub img_data: Vec<f64>,
    /// The width (in pixels) of the image.
    pub width: usize,
    /// The height (in pixels) of the image.
    pub height: usize,
}

impl Default for Photo {
    /// Creates an empty `Photo` with zero width and height, and no image data.
    fn default() -> Photo {
        Photo {
            img_data: Vec::new(),
            width: 0,
            height: 0,
        }
    }
}

impl Photo {
    /// Creates a black `Photo` of the given size.
    pub fn new_black(width: usize, height: usize) -> Photo {
        Photo {
            img_data: vec![0.0; width * height * 3],
            width,
            height,
        }
    }

    /// Builds a `Photo` by evaluating `f(x, y)` for every pixel.
    ///
    /// # Examples
    /// ```
    /// # use aamfilter::photo::Photo;
    /// let photo = Photo::from_fn(4, 2, |x, y| [x as f64 / 4.0, y as f64 / 2.0, 0.5]);
    /// assert_eq!(photo.get_rgb(2, 1), [0.5, 0.5, 0.5]);
    /// ```
    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Photo
    where
        F: Fn(usize, usize) -> [f64; 3],
    {
        let mut img_data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                img_data.extend_from_slice(&f(x, y));
            }
        }
        Photo {
            img_data,
            width,
            height,
        }
    }

    /// Converts 8-bit RGBA data (as produced by most decoders) into a `Photo`
    /// with channels scaled to `[0, 1]`. The alpha channel is dropped, and
    /// pixels missing from a short buffer are black.
    pub fn from_rgba8(data: &[u8], width: usize, height: usize) -> Photo {
        let mut img_data = Vec::with_capacity(width * height * 3);
        for px in data.chunks_exact(4).take(width * height) {
            img_data.push(px[0] as f64 / 255.0);
            img_data.push(px[1] as f64 / 255.0);
            img_data.push(px[2] as f64 / 255.0);
        }
        img_data.resize(width * height * 3, 0.0);
        Photo {
            img_data,
            width,
            height,
        }
    }

    /// Converts the photo back to packed 8-bit RGB, clamping every channel to `[0, 1]`.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.img_data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }

    /// Returns the `[r, g, b]` components at the pixel coordinate `(x, y)`.
    ///
    /// If `(x, y)` is out of bounds, this method returns black.
    pub fn get_rgb(&self, x: usize, y: usize) -> [f64; 3] {
        if x >= self.width || y >= self.height {
            [0.0, 0.0, 0.0]
        } else {
            let index = (y * self.width + x) * 3;
            [
                self.img_data[index],
                self.img_data[index + 1],
                self.img_data[index + 2],
            ]
        }
    }

    /// Writes `rgb` at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set_rgb(&mut self, x: usize, y: usize, rgb: [f64; 3]) {
        if x < self.width && y < self.height {
            let index = (y * self.width + x) * 3;
            self.img_data[index..index + 3].copy_from_slice(&rgb);
        }
    }

    /// Samples the photo at a sub-pixel location with bilinear interpolation.
    ///
    /// The four neighbours `(x0, y0)`..`(x0 + 1, y0 + 1)` must all lie inside the
    /// image; otherwise the sample is black. This makes the last row and column
    /// unreachable for fractional lookups, which is the boundary policy the warp
    /// relies on.
    ///
    /// # Examples
    /// ```
    /// # use aamfilter::photo::Photo;
    /// let photo = Photo::from_fn(3, 3, |x, _| [x as f64, 0.0, 0.0]);
    /// assert!((photo.sample_bilinear(0.5, 0.0)[0] - 0.5).abs() < 1e-12);
    /// assert_eq!(photo.sample_bilinear(-0.5, 0.0), [0.0, 0.0, 0.0]);
    /// ```
    pub fn sample_bilinear(&self, x: f64, y: f64) -> [f64; 3] {
        if !x.is_finite() || !y.is_finite() {
            return [0.0, 0.0, 0.0];
        }
        let x0 = x.floor() as isize;
        let y0 = y.floor() as isize;
        let x1 = x0 + 1;
        let y1 = y0 + 1;

        if x0 < 0 || y0 < 0 || x1 >= self.width as isize || y1 >= self.height as isize {
            return [0.0, 0.0, 0.0];
        }

        let dx = x - x0 as f64;
        let dy = y - y0 as f64;
        let p00 = self.get_rgb(x0 as usize, y0 as usize);
        let p10 = self.get_rgb(x1 as usize, y0 as usize);
        let p01 = self.get_rgb(x0 as usize, y1 as usize);
        let p11 = self.get_rgb(x1 as usize, y1 as usize);

        let mut out = [0.0; 3];
        for c in 0..3 {
            out[c] = p00[c] * (1.0 - dx) * (1.0 - dy)
                + p10[c] * dx * (1.0 - dy)
                + p01[c] * (1.0 - dx) * dy
                + p11[c] * dx * dy;
        }
        out
    }

    /// Returns a copy of this photo with every landmark of `shape` drawn as a
    /// small filled green disc.
    pub fn annotated_with(&self, shape: &Shape) -> Photo {
        let mut annotated = self.clone();
        let radius = 1isize;
        for p in shape.points() {
            let cx = p.x.round() as isize;
            let cy = p.y.round() as isize;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx * dx + dy * dy > radius * radius {
                        continue;
                    }
                    let (x, y) = (cx + dx, cy + dy);
                    if x >= 0 && y >= 0 {
                        annotated.set_rgb(x as usize, y as usize, [0.0, 1.0, 0.0]);
                    }
                }
            }
        }
        annotated
    }
}
