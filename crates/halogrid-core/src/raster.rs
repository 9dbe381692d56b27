//! The coordinator's N x N pixel grid, deterministic test inputs, and
//! conversion to and from encoded grayscale images.

use image::{GrayImage, Luma};

use crate::geometry::TileExtent;
use crate::types::{ImageError, Pixel};

/// The full image held by the coordinator.
///
/// It is both the input of a run and, after collection, its output: the
/// collector overwrites it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalImage {
    size: usize,
    pixels: Vec<Pixel>,
}

impl GlobalImage {
    /// A `size x size` image of zeros.
    #[must_use]
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            pixels: vec![0; size * size],
        }
    }

    /// Build an image by evaluating `f(row, col)` for every pixel.
    pub fn from_fn(size: usize, mut f: impl FnMut(usize, usize) -> Pixel) -> Self {
        let mut pixels = Vec::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                pixels.push(f(row, col));
            }
        }
        Self { size, pixels }
    }

    /// Wrap a row-major buffer of `size * size` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::SizeMismatch`] when the buffer length is not
    /// `size * size`.
    pub fn from_pixels(size: usize, pixels: Vec<Pixel>) -> Result<Self, ImageError> {
        if pixels.len() != size * size {
            return Err(ImageError::SizeMismatch {
                expected: size * size,
                found: pixels.len(),
            });
        }
        Ok(Self { size, pixels })
    }

    /// The diagonal test pattern `pixel[i][j] = (i*31 + j*17) mod 256`.
    #[must_use]
    pub fn test_pattern(size: usize) -> Self {
        Self::from_fn(size, |row, col| to_pixel((row * 31 + col * 17) % 256))
    }

    /// The flat benchmark pattern `pixel[k] = k mod 256` over the row-major
    /// index `k`.
    #[must_use]
    pub fn modulo_pattern(size: usize) -> Self {
        Self::from_fn(size, |row, col| to_pixel((row * size + col) % 256))
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// All pixels, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Pixel at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Pixel {
        self.pixels[row * self.size + col]
    }

    /// Overwrite the pixel at `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: Pixel) {
        self.pixels[row * self.size + col] = value;
    }

    /// Full row `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> &[Pixel] {
        &self.pixels[row * self.size..(row + 1) * self.size]
    }

    /// The part of global row `extent.row_start + local_row` that lies in
    /// `extent`.
    #[must_use]
    pub fn tile_row(&self, extent: &TileExtent, local_row: usize) -> &[Pixel] {
        let start = (extent.row_start + local_row) * self.size + extent.col_start;
        &self.pixels[start..start + extent.cols]
    }

    /// Mutable view of the part of global row `extent.row_start + local_row`
    /// that lies in `extent`.
    pub fn tile_row_mut(&mut self, extent: &TileExtent, local_row: usize) -> &mut [Pixel] {
        let start = (extent.row_start + local_row) * self.size + extent.col_start;
        &mut self.pixels[start..start + extent.cols]
    }

    /// Convert an 8-bit grayscale image.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NotSquare`] unless width equals height.
    pub fn from_gray(image: &GrayImage) -> Result<Self, ImageError> {
        let (width, height) = image.dimensions();
        if width != height {
            return Err(ImageError::NotSquare { width, height });
        }
        Ok(Self {
            size: width as usize,
            pixels: image.as_raw().iter().map(|&v| Pixel::from(v)).collect(),
        })
    }

    /// Decode any format the `image` crate understands and convert it to
    /// 8-bit luma.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Codec`] when decoding fails and
    /// [`ImageError::NotSquare`] for non-square inputs.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Self::from_gray(&decoded.to_luma8())
    }

    /// Convert to an 8-bit grayscale image, clamping every value to
    /// `0..=255`.
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        let side = u32::try_from(self.size).unwrap_or(u32::MAX);
        GrayImage::from_fn(side, side, |x, y| {
            let value = self.get(y as usize, x as usize).clamp(0, 255);
            Luma([u8::try_from(value).unwrap_or(u8::MAX)])
        })
    }

    /// Encode as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Codec`] when encoding fails.
    pub fn encode_png(&self) -> Result<Vec<u8>, ImageError> {
        let gray = self.to_gray();
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            gray.as_raw(),
            gray.width(),
            gray.height(),
            image::ExtendedColorType::L8,
        )?;
        Ok(buf)
    }
}

/// Narrow a value already reduced modulo 256.
fn to_pixel(value: usize) -> Pixel {
    Pixel::try_from(value).unwrap_or(Pixel::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_formula() {
        let img = GlobalImage::test_pattern(8);
        assert_eq!(img.get(0, 0), 0);
        assert_eq!(img.get(0, 1), 17);
        assert_eq!(img.get(1, 0), 31);
        assert_eq!(img.get(7, 7), (7 * 31 + 7 * 17) % 256);
        assert!(img.as_slice().iter().all(|&v| (0..256).contains(&v)));
    }

    #[test]
    fn modulo_pattern_wraps_row_major_index() {
        let img = GlobalImage::modulo_pattern(20);
        assert_eq!(img.get(0, 5), 5);
        assert_eq!(img.get(12, 16), (12 * 20 + 16) % 256);
        assert_eq!(img.get(19, 19), 399 % 256);
    }

    #[test]
    fn tile_rows_address_the_extent() {
        let mut img = GlobalImage::test_pattern(6);
        let extent = TileExtent {
            row_start: 3,
            col_start: 2,
            rows: 3,
            cols: 2,
        };
        assert_eq!(img.tile_row(&extent, 1), &img.row(4)[2..4]);
        img.tile_row_mut(&extent, 0).fill(-1);
        assert_eq!(&img.row(3)[2..4], &[-1, -1]);
        assert_ne!(img.get(3, 1), -1);
        assert_ne!(img.get(3, 4), -1);
    }

    #[test]
    fn from_pixels_checks_length() {
        let err = GlobalImage::from_pixels(3, vec![0; 8]).unwrap_err();
        assert!(matches!(
            err,
            ImageError::SizeMismatch {
                expected: 9,
                found: 8
            }
        ));
        assert!(GlobalImage::from_pixels(3, vec![0; 9]).is_ok());
    }

    #[test]
    fn gray_conversion_clamps() {
        let mut img = GlobalImage::zeros(3);
        img.set(0, 0, -5);
        img.set(1, 1, 300);
        img.set(2, 2, 128);
        let gray = img.to_gray();
        assert_eq!(gray.get_pixel(0, 0).0[0], 0);
        assert_eq!(gray.get_pixel(1, 1).0[0], 255);
        assert_eq!(gray.get_pixel(2, 2).0[0], 128);
    }

    #[test]
    fn rejects_non_square_gray() {
        let gray = GrayImage::new(4, 3);
        assert!(matches!(
            GlobalImage::from_gray(&gray),
            Err(ImageError::NotSquare {
                width: 4,
                height: 3
            })
        ));
    }

    #[test]
    fn png_round_trip_preserves_in_range_pixels() {
        let img = GlobalImage::test_pattern(16);
        let png = img.encode_png().unwrap();
        let decoded = GlobalImage::decode(&png).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            GlobalImage::decode(&[0xFF, 0x00, 0x12]),
            Err(ImageError::Codec(_))
        ));
    }

    #[test]
    fn gray_x_is_column_and_y_is_row() {
        let img = GlobalImage::from_fn(4, |row, col| to_pixel(row * 4 + col));
        let gray = img.to_gray();
        assert_eq!(gray.get_pixel(3, 0).0[0], 3);
        assert_eq!(gray.get_pixel(0, 3).0[0], 12);
    }
}
