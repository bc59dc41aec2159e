//! Core image geometry for scanned exam sheets.
//!
//! This crate is intentionally small and purely geometric. It knows nothing
//! about templates, answer keys or scoring; it only works on in-memory RGBA
//! buffers and plain geometric types:
//! - 1-D darkness profiles and weighted peak extraction,
//! - connected-component (blob) search in bounded regions,
//! - four-point homographies solved by Gaussian elimination,
//! - region warping / cropping with a transparent out-of-bounds policy,
//! - an explicit batch-scoped pixel-buffer cache.

mod blob;
mod cache;
mod geometry;
mod homography;
mod image;
mod logger;
mod profile;
mod warp;

pub use blob::{find_blob, Blob, BlobSearch, BlobSelection, DarkThreshold};
pub use cache::{ImageKey, PixelCache};
pub use geometry::{CornerId, Corners, GeometryError, PixelRect, Region};
pub use homography::{solve_homography, Homography, HomographyError, PIVOT_EPSILON};
pub use image::{luminance, RgbaImage, RgbaImageView, TRANSPARENT};
pub use profile::{find_peaks, projection_profile, Axis, Peak};
pub use warp::{crop_region, warp_region, Sampling};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
