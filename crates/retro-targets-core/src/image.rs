/// Borrowed 8-bit grayscale image, row-major.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl<'a> GrayImageView<'a> {
    /// Wrap a raw buffer, checking that it holds exactly `width * height` bytes.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.width > 0
            && self.height > 0
            && x >= 0.0
            && y >= 0.0
            && x <= (self.width - 1) as f64
            && y <= (self.height - 1) as f64
    }

    /// Pixel lookup with border replication.
    #[inline]
    fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let xc = x.clamp(0, self.width as i64 - 1) as usize;
        let yc = y.clamp(0, self.height as i64 - 1) as usize;
        self.data[yc * self.width + xc]
    }
}

/// Bilinear sample at a subpixel position; pixels outside the image replicate the border.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    if src.width == 0 || src.height == 0 {
        return 0.0;
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get_clamped(x0, y0) as f64;
    let p10 = src.get_clamped(x0 + 1, y0) as f64;
    let p01 = src.get_clamped(x0, y0 + 1) as f64;
    let p11 = src.get_clamped(x0 + 1, y0 + 1) as f64;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(GrayImageView::new(3, 3, &[0u8; 8]).is_none());
        assert!(GrayImageView::new(3, 3, &[0u8; 9]).is_some());
    }

    #[test]
    fn bilinear_interpolates_and_replicates_border() {
        let data = [0u8, 100, 200, 100];
        let img = GrayImageView::new(2, 2, &data).unwrap();
        assert_eq!(sample_bilinear(&img, 0.5, 0.0), 50.0);
        assert_eq!(sample_bilinear(&img, 0.5, 0.5), 100.0);
        assert_eq!(sample_bilinear(&img, -3.0, -3.0), 0.0);
        assert_eq!(sample_bilinear(&img, 5.0, 5.0), 100.0);
    }
}
