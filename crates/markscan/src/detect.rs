//! Adapters between the `image` crate and the pipeline's buffer types.

use std::path::{Path, PathBuf};

use crate::core::{ImageKey, RgbaImage, RgbaImageView};
use crate::{GradeError, ImageSource, PageGrader, PageReport};

/// Borrow an `image::RgbaImage` as a `markscan-core` view.
pub fn rgba_view(img: &::image::RgbaImage) -> RgbaImageView<'_> {
    RgbaImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Copy an `image::RgbaImage` into an owned core buffer.
pub fn from_rgba(img: &::image::RgbaImage) -> RgbaImage {
    rgba_view(img).to_owned_image()
}

/// Convert any decoded image (gray, RGB, 16-bit, ...) to RGBA8.
pub fn from_dynamic(img: &::image::DynamicImage) -> RgbaImage {
    let rgba = img.to_rgba8();
    RgbaImage {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        data: rgba.into_raw(),
    }
}

/// Back to the `image` crate, e.g. to save a rectified crop.
pub fn to_image(img: &RgbaImage) -> Option<::image::RgbaImage> {
    ::image::RgbaImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
}

/// A page stored on disk in any format the `image` crate decodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileImage {
    path: PathBuf,
}

impl FileImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileImage {
    fn key(&self) -> ImageKey {
        ImageKey::new(self.path.display().to_string())
    }

    fn load(&self) -> Result<RgbaImage, GradeError> {
        let img = ::image::open(&self.path).map_err(|source| GradeError::Decode {
            key: self.key(),
            source,
        })?;
        log::debug!("decoded {} ({}x{})", self.path.display(), img.width(), img.height());
        Ok(from_dynamic(&img))
    }
}

/// Grade an already-decoded `image` buffer.
pub fn grade_image(
    grader: &PageGrader<'_>,
    key: impl Into<String>,
    img: &::image::DynamicImage,
) -> Result<PageReport, GradeError> {
    let page = from_dynamic(img);
    grader.grade_page(&ImageKey::new(key), &page.view())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_images_become_opaque_rgba() {
        let gray = ::image::GrayImage::from_fn(3, 2, |x, y| ::image::Luma([(x + 10 * y) as u8]));
        let rgba = from_dynamic(&::image::DynamicImage::ImageLuma8(gray));
        assert_eq!((rgba.width, rgba.height), (3, 2));
        assert_eq!(rgba.view().pixel(2, 1), [12, 12, 12, 255]);
        let back = to_image(&rgba).expect("dimensions match");
        assert_eq!(from_rgba(&back), rgba);
    }

    #[test]
    fn file_source_reports_decode_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("not_an_image.png");
        std::fs::write(&path, b"plain text").expect("write");
        let err = FileImage::new(&path).load().unwrap_err();
        assert!(matches!(err, GradeError::Decode { .. }));
    }

    #[test]
    fn file_source_decodes_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("page.png");
        ::image::RgbaImage::from_pixel(4, 3, ::image::Rgba([9, 8, 7, 255]))
            .save(&path)
            .expect("save");
        let img = FileImage::new(&path).load().expect("load");
        assert_eq!((img.width, img.height), (4, 3));
        assert_eq!(img.view().pixel(3, 2), [9, 8, 7, 255]);
    }
}
