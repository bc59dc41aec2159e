/// Fully transparent RGBA pixel, used for "no data" output.
pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Perceptual luminance of an RGB triple (`0.299R + 0.587G + 0.114B`).
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

#[derive(Clone, Copy, Debug)]
pub struct RgbaImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major RGBA8, len = w*h*4
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbaImage {
    /// Allocate a fully transparent image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height * 4],
        }
    }

    /// Allocate an opaque image filled with one gray level.
    pub fn filled(width: usize, height: usize, level: u8) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&[level, level, level, 255]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Build an opaque RGBA image from a row-major 8-bit grayscale buffer.
    ///
    /// Returns `None` when `gray.len() != width * height`.
    pub fn from_gray(width: usize, height: usize, gray: &[u8]) -> Option<Self> {
        if gray.len() != width.checked_mul(height)? {
            return None;
        }
        let mut data = Vec::with_capacity(gray.len() * 4);
        for &v in gray {
            data.extend_from_slice(&[v, v, v, 255]);
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap an existing RGBA8 buffer, checking its length.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        if data.len() != width.checked_mul(height)?.checked_mul(4)? {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> RgbaImageView<'_> {
        RgbaImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn put_pixel(&mut self, x: usize, y: usize, px: [u8; 4]) {
        if x < self.width && y < self.height {
            let i = (y * self.width + x) * 4;
            self.data[i..i + 4].copy_from_slice(&px);
        }
    }

    /// Paint an axis-aligned opaque gray rectangle, clipped to the image.
    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, level: u8) {
        let x0 = x.max(0) as usize;
        let y0 = y.max(0) as usize;
        let x1 = (x + w).clamp(0, self.width as i64) as usize;
        let y1 = (y + h).clamp(0, self.height as i64) as usize;
        for yy in y0..y1 {
            for xx in x0..x1 {
                self.put_pixel(xx, yy, [level, level, level, 255]);
            }
        }
    }
}

impl<'a> RgbaImageView<'a> {
    /// `true` when the buffer length matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(4))
            .is_some_and(|n| n == self.data.len())
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Luminance of pixel `(x, y)`, or `None` for transparent pixels.
    #[inline]
    pub fn luma(&self, x: usize, y: usize) -> Option<f32> {
        let [r, g, b, a] = self.pixel(x, y);
        (a != 0).then(|| luminance(r, g, b))
    }

    /// Nearest-neighbour sample at a continuous coordinate (pixel `(x, y)`
    /// covers `[x, x+1)`). Outside the image the result is transparent.
    #[inline]
    pub fn sample_nearest(&self, x: f32, y: f32) -> [u8; 4] {
        if !(x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32) {
            return TRANSPARENT;
        }
        self.pixel(x as usize, y as usize)
    }

    /// Bilinear sample at a continuous coordinate.
    ///
    /// Interpolates between pixel centers, clamping neighbours at the image
    /// border. Outside `[0, w) × [0, h)` the result is transparent.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> [u8; 4] {
        if !(x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32) {
            return TRANSPARENT;
        }
        let gx = x - 0.5;
        let gy = y - 0.5;
        let x0 = gx.floor();
        let y0 = gy.floor();
        let fx = gx - x0;
        let fy = gy - y0;

        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let cx = |v: i64| v.clamp(0, max_x) as usize;
        let cy = |v: i64| v.clamp(0, max_y) as usize;
        let (xi, yi) = (x0 as i64, y0 as i64);

        let p00 = self.pixel(cx(xi), cy(yi));
        let p10 = self.pixel(cx(xi + 1), cy(yi));
        let p01 = self.pixel(cx(xi), cy(yi + 1));
        let p11 = self.pixel(cx(xi + 1), cy(yi + 1));

        let mut out = [0u8; 4];
        for c in 0..4 {
            let a = p00[c] as f32 + fx * (p10[c] as f32 - p00[c] as f32);
            let b = p01[c] as f32 + fx * (p11[c] as f32 - p01[c] as f32);
            out[c] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    /// Copy out as an owned image.
    pub fn to_owned_image(&self) -> RgbaImage {
        RgbaImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_weights_sum_to_white() {
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-3);
        assert_eq!(luminance(0, 0, 0), 0.0);
    }

    #[test]
    fn transparent_pixels_have_no_luma() {
        let mut img = RgbaImage::filled(2, 1, 200);
        img.put_pixel(1, 0, TRANSPARENT);
        let view = img.view();
        assert!(view.luma(0, 0).is_some());
        assert!(view.luma(1, 0).is_none());
    }

    #[test]
    fn bilinear_at_pixel_centers_is_exact() {
        let img = RgbaImage::from_gray(3, 1, &[0, 100, 200]).expect("gray");
        let view = img.view();
        assert_eq!(view.sample_bilinear(1.5, 0.5)[0], 100);
        assert_eq!(view.sample_bilinear(1.0, 0.5)[0], 50);
        assert_eq!(view.sample_bilinear(3.0, 0.5), TRANSPARENT);
        assert_eq!(view.sample_nearest(-0.1, 0.5), TRANSPARENT);
    }

    #[test]
    fn from_gray_rejects_wrong_length() {
        assert!(RgbaImage::from_gray(2, 2, &[0, 1, 2]).is_none());
    }
}
