use crate::{GeometryError, Homography, Region, RgbaImage, RgbaImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    #[default]
    Nearest,
    Bilinear,
}

fn output_size(target: &Region) -> (usize, usize) {
    (
        target.width.round().max(1.0) as usize,
        target.height.round().max(1.0) as usize,
    )
}

/// Resample `target` (given in destination/template coordinates) from `src`.
///
/// `h_src_from_dst` maps destination coordinates into the source image, so
/// for template → scanned page it is the homography solved with
/// `src = ideal corners`, `dst = detected corners`. Each output pixel samples
/// the source at `H · (target.x + dx + 0.5, target.y + dy + 0.5)`; samples
/// falling outside the source are fully transparent.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip(src, h_src_from_dst), fields(w = target.width, h = target.height))
)]
pub fn warp_region(
    src: &RgbaImageView<'_>,
    h_src_from_dst: &Homography,
    target: &Region,
    sampling: Sampling,
) -> Result<RgbaImage, GeometryError> {
    target.validate()?;
    if !src.is_consistent() {
        return Err(GeometryError::InvalidImage {
            width: src.width,
            height: src.height,
        });
    }
    let (out_w, out_h) = output_size(target);
    let mut out = RgbaImage::new(out_w, out_h);

    for dy in 0..out_h {
        for dx in 0..out_w {
            let p_dst = Point2::new(
                target.x + dx as f32 + 0.5,
                target.y + dy as f32 + 0.5,
            );
            let p_src = h_src_from_dst.apply(p_dst);
            let px = match sampling {
                Sampling::Nearest => src.sample_nearest(p_src.x, p_src.y),
                Sampling::Bilinear => src.sample_bilinear(p_src.x, p_src.y),
            };
            let i = (dy * out_w + dx) * 4;
            out.data[i..i + 4].copy_from_slice(&px);
        }
    }

    Ok(out)
}

/// Un-corrected crop of `region` from `src`; pixels outside the source are transparent.
///
/// Equivalent to [`warp_region`] with the identity homography and nearest sampling.
pub fn crop_region(src: &RgbaImageView<'_>, region: &Region) -> Result<RgbaImage, GeometryError> {
    warp_region(src, &Homography::identity(), region, Sampling::Nearest)
}
