//! Cropping scanned pages down to their content.
//!
//! Scans usually come with a dark border, a ruler or a colour card along one
//! edge. Each [`CropMethod`] is a different heuristic for finding the actual
//! document. They are all pure functions of the input image.

use std::{fs::File, io::BufWriter};

use clap::ValueEnum;
use image::{DynamicImage, GenericImageView as _, GrayImage, codecs::jpeg::JpegEncoder};
use imageproc::{
    contours::{BorderType, Contour, find_contours},
    geometry::contour_area,
};

use crate::prelude::*;

/// Rows removed from the bottom of landscape scans by [`CropMethod::Fixed`].
const LANDSCAPE_MARGIN: u32 = 1661;

/// Rows removed from the bottom of portrait scans by [`CropMethod::Fixed`].
const PORTRAIT_MARGIN: u32 = 1580;

/// Pixels with any channel above this count as content for
/// [`CropMethod::DarkTol`].
const DARK_THRESHOLD: u8 = 50;

/// Binarization threshold for [`CropMethod::Contour`].
const CONTOUR_THRESHOLD: u8 = 10;

/// Default JPEG quality for cropped output.
pub const DEFAULT_QUALITY: u8 = 70;

/// How to find the part of the image worth keeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum CropMethod {
    /// Cut a fixed margin off the bottom, then trim empty borders.
    Fixed,

    /// Keep the bounding box of everything brighter than near-black.
    DarkTol,

    /// Keep the bounding box of all non-black pixels.
    Grayscale,

    /// Keep the bounding box of the largest outer contour.
    #[default]
    Contour,
}

/// What happened when we cropped a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    /// We wrote a cropped image of this size.
    Written { width: u32, height: u32 },

    /// Nothing looked like content, so we wrote nothing.
    NoObjectFound,
}

/// A pixel rectangle: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Bounds {
    /// The smallest rectangle containing all `(x, y)` points, if any.
    fn enclosing(points: impl IntoIterator<Item = (u32, u32)>) -> Option<Bounds> {
        let mut extent: Option<(u32, u32, u32, u32)> = None;
        for (x, y) in points {
            extent = Some(match extent {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        extent.map(|(x0, y0, x1, y1)| Bounds {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
    }

    fn crop(self, img: &DynamicImage) -> DynamicImage {
        img.crop_imm(self.x, self.y, self.width, self.height)
    }
}

/// Bounding box of all pixels matching `is_content`.
fn content_bounds(
    img: &DynamicImage,
    is_content: impl Fn(image::Rgba<u8>) -> bool,
) -> Option<Bounds> {
    Bounds::enclosing(
        img.pixels()
            .filter(|&(_, _, px)| is_content(px))
            .map(|(x, y, _)| (x, y)),
    )
}

/// Bounding box of the non-zero pixels of `img`. Images with an alpha
/// channel use alpha alone, so transparent borders get trimmed.
fn non_zero_bounds(img: &DynamicImage) -> Option<Bounds> {
    if img.color().has_alpha() {
        content_bounds(img, |px| px.0[3] > 0)
    } else {
        content_bounds(img, |px| px.0[..3].iter().any(|&c| c > 0))
    }
}

/// Crop `img` using `method`. Returns `None` if no content was found.
pub fn crop_image(img: &DynamicImage, method: CropMethod) -> Option<DynamicImage> {
    match method {
        CropMethod::Fixed => crop_fixed(img),
        CropMethod::DarkTol => {
            content_bounds(img, |px| px.0[..3].iter().any(|&c| c > DARK_THRESHOLD))
                .map(|b| b.crop(img))
        }
        CropMethod::Grayscale => {
            let gray = img.to_luma8();
            Bounds::enclosing(
                gray.enumerate_pixels()
                    .filter(|(_, _, px)| px.0[0] > 0)
                    .map(|(x, y, _)| (x, y)),
            )
            .map(|b| b.crop(img))
        }
        CropMethod::Contour => largest_contour_bounds(&img.to_luma8()).map(|b| b.crop(img)),
    }
}

/// Remove the bottom margin, then trim to content.
///
/// If the trimmed image turns out to be empty, we keep the margin-cropped
/// image as-is. We only give up if the margin eats the whole image.
fn crop_fixed(img: &DynamicImage) -> Option<DynamicImage> {
    let (width, height) = img.dimensions();
    let margin = if width > height {
        LANDSCAPE_MARGIN
    } else {
        PORTRAIT_MARGIN
    };
    let kept_height = height.saturating_sub(margin);
    if kept_height == 0 || width == 0 {
        return None;
    }
    let cropped = img.crop_imm(0, 0, width, kept_height);
    match non_zero_bounds(&cropped) {
        Some(bounds) => Some(bounds.crop(&cropped)),
        None => Some(cropped),
    }
}

/// Threshold `gray`, then find the bounding box of the largest outermost
/// contour.
fn largest_contour_bounds(gray: &GrayImage) -> Option<Bounds> {
    let mut binary = gray.clone();
    for px in binary.pixels_mut() {
        px.0[0] = if px.0[0] > CONTOUR_THRESHOLD { 255 } else { 0 };
    }

    let contours = find_contours::<u32>(&binary);
    let mut best: Option<(f64, &Contour<u32>)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    {
        let area = contour_area(&contour.points).abs();
        // Ties go to the first contour found.
        if best.is_none_or(|(best_area, _)| area > best_area) {
            best = Some((area, contour));
        }
    }
    let (area, contour) = best?;
    trace!(area, points = contour.points.len(), "Largest contour");
    Bounds::enclosing(contour.points.iter().map(|p| (p.x, p.y)))
}

/// Is `path` a JPEG file name?
fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

/// Save `img` to `path`, choosing the format from the extension. JPEG output
/// uses `quality`.
fn save_image(img: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    if is_jpeg_path(path) {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100));
        // JPEG has no alpha channel.
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(encoder)
            .with_context(|| format!("failed to encode {}", path.display()))?;
    } else {
        img.save(path)
            .with_context(|| format!("failed to save {}", path.display()))?;
    }
    Ok(())
}

/// Crop the image at `input` and write the result to `output`.
///
/// If no content is found, nothing is written.
#[instrument(level = "debug", skip_all, fields(input = %input.display(), method = ?method))]
pub fn crop_file(
    input: &Path,
    output: &Path,
    method: CropMethod,
    quality: u8,
) -> Result<CropOutcome> {
    let img = image::open(input)
        .with_context(|| format!("failed to open image {}", input.display()))?;
    let Some(cropped) = crop_image(&img, method) else {
        return Ok(CropOutcome::NoObjectFound);
    };
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    save_image(&cropped, output, quality)?;
    let (width, height) = cropped.dimensions();
    Ok(CropOutcome::Written { width, height })
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    /// A black `width`×`height` image with a filled rectangle of `color`.
    fn framed(
        width: u32,
        height: u32,
        (x, y, w, h): (u32, u32, u32, u32),
        color: [u8; 3],
    ) -> DynamicImage {
        let mut img = RgbImage::new(width, height);
        for py in y..y + h {
            for px in x..x + w {
                img.put_pixel(px, py, Rgb(color));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn dark_tol_crops_to_bright_region() {
        let img = framed(40, 30, (5, 7, 10, 8), [200, 200, 200]);
        let cropped = crop_image(&img, CropMethod::DarkTol).unwrap();
        assert_eq!(cropped.dimensions(), (10, 8));
    }

    #[test]
    fn dark_tol_ignores_near_black() {
        let img = framed(20, 20, (2, 2, 5, 5), [40, 50, 30]);
        assert!(crop_image(&img, CropMethod::DarkTol).is_none());
    }

    #[test]
    fn grayscale_keeps_any_non_black_pixel() {
        let img = framed(20, 20, (3, 4, 2, 6), [0, 9, 0]);
        let cropped = crop_image(&img, CropMethod::Grayscale).unwrap();
        assert_eq!(cropped.dimensions(), (2, 6));
        assert!(crop_image(&framed(5, 5, (0, 0, 0, 0), [0; 3]), CropMethod::Grayscale).is_none());
    }

    #[test]
    fn contour_picks_largest_object() {
        let mut img = framed(60, 40, (30, 5, 20, 25), [255, 255, 255]).to_rgb8();
        // A smaller blob elsewhere.
        for y in 2..6 {
            for x in 2..6 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let img = DynamicImage::ImageRgb8(img);
        let cropped = crop_image(&img, CropMethod::Contour).unwrap();
        assert_eq!(cropped.dimensions(), (20, 25));
        assert!(crop_image(&framed(10, 10, (0, 0, 0, 0), [0; 3]), CropMethod::Contour).is_none());
    }

    #[test]
    fn fixed_cuts_bottom_margin_by_orientation() {
        // Portrait: 1600 - 1580 leaves 20 rows, all content.
        let portrait = framed(100, 1600, (0, 0, 100, 1600), [255, 0, 0]);
        assert_eq!(crop_image(&portrait, CropMethod::Fixed).unwrap().dimensions(), (100, 20));

        // Landscape: 1700 - 1661 leaves 39 rows; content only in part of it.
        let landscape = framed(1800, 1700, (10, 5, 30, 10), [255, 255, 255]);
        assert_eq!(
            crop_image(&landscape, CropMethod::Fixed).unwrap().dimensions(),
            (30, 10)
        );

        // Too small to survive the margin.
        assert!(crop_image(&framed(10, 10, (0, 0, 10, 10), [255; 3]), CropMethod::Fixed).is_none());
    }

    #[test]
    fn fixed_trims_transparent_borders() {
        let mut img = RgbaImage::new(50, 1600);
        for y in 3..9 {
            for x in 4..14 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let cropped = crop_image(&DynamicImage::ImageRgba8(img), CropMethod::Fixed).unwrap();
        assert_eq!(cropped.dimensions(), (10, 6));
    }

    #[test]
    fn all_dark_file_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dark.png");
        framed(30, 30, (0, 0, 30, 30), [10, 10, 10]).save(&input).unwrap();
        let output = dir.path().join("out.jpg");

        let outcome = crop_file(&input, &output, CropMethod::DarkTol, DEFAULT_QUALITY).unwrap();
        assert_eq!(outcome, CropOutcome::NoObjectFound);
        assert!(!output.exists());
    }

    #[test]
    fn writes_jpeg_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        framed(64, 48, (8, 8, 32, 16), [220, 210, 200]).save(&input).unwrap();
        let output = dir.path().join("nested").join("out.jpg");

        let outcome = crop_file(&input, &output, CropMethod::DarkTol, 90).unwrap();
        assert_eq!(outcome, CropOutcome::Written { width: 32, height: 16 });
        let written = image::open(&output).unwrap();
        assert_eq!(written.dimensions(), (32, 16));
    }
}
