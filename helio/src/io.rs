// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Image file I/O: BMP, TIFF (uncompressed subset), FITS and optionally PNG.

use std::path::Path;

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};

pub mod bmp;
pub mod fits;
#[cfg(feature = "png-format")]
pub mod png;
pub mod tiff;

/// Supported output file formats.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    /// 8-bit mono BMP.
    Bmp8,
    /// 8-bit mono PNG.
    #[cfg(feature = "png-format")]
    Png8,
    /// 8-bit mono TIFF, no compression.
    Tiff8,
    /// 16-bit mono TIFF, no compression.
    Tiff16,
    /// 32-bit floating-point mono TIFF, no compression.
    Tiff32F,
    Fits8,
    Fits16,
    Fits32F,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Bmp8 => "bmp",
            #[cfg(feature = "png-format")]
            OutputFormat::Png8 => "png",
            OutputFormat::Tiff8 | OutputFormat::Tiff16 | OutputFormat::Tiff32F => "tif",
            OutputFormat::Fits8 | OutputFormat::Fits16 | OutputFormat::Fits32F => "fit",
        }
    }

    /// Pixel format the image is converted to before saving.
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            OutputFormat::Bmp8 => PixelFormat::Mono8,
            #[cfg(feature = "png-format")]
            OutputFormat::Png8 => PixelFormat::Mono8,
            OutputFormat::Tiff8 | OutputFormat::Fits8 => PixelFormat::Mono8,
            OutputFormat::Tiff16 | OutputFormat::Fits16 => PixelFormat::Mono16,
            OutputFormat::Tiff32F | OutputFormat::Fits32F => PixelFormat::Mono32F,
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Loads an image, with the pixel format the file dictates.
/// FITS float data is normalized to `[0, 1]` when `normalize_fits` is set
/// and the data maximum exceeds 1.
pub fn load_image(path: &Path, normalize_fits: bool) -> Result<Image> {
    match extension_of(path).as_str() {
        "bmp" => bmp::read_bmp(path),
        "tif" | "tiff" => tiff::read_tiff(path),
        "fit" | "fits" => fits::read_fits(path, normalize_fits),
        #[cfg(feature = "png-format")]
        "png" => png::read_png(path),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

/// Loads an image converted to `Mono32F`.
pub fn load_image_as_mono32f(path: &Path, normalize_fits: bool) -> Result<Image> {
    let img = load_image(path, normalize_fits)?;
    if img.format() == PixelFormat::Mono32F {
        Ok(img)
    } else {
        img.convert_pixel_format(PixelFormat::Mono32F, None)
    }
}

/// Loads an image as `Mono8` with its brightness range stretched to the full
/// 8-bit span, as the limb detector's histogram analysis expects.
pub fn load_image_as_mono8(path: &Path, normalize_fits: bool) -> Result<Image> {
    let mut img = load_image_as_mono32f(path, normalize_fits)?;
    crate::proc::normalize::normalize_fp_image(&mut img, 0.0, 1.0);
    img.convert_pixel_format(PixelFormat::Mono8, None)
}

/// Reads only the image dimensions (width, height) from a file header.
pub fn image_size(path: &Path) -> Result<(u32, u32)> {
    match extension_of(path).as_str() {
        "bmp" => bmp::bmp_size(path),
        "tif" | "tiff" => tiff::tiff_size(path),
        "fit" | "fits" => fits::fits_size(path),
        #[cfg(feature = "png-format")]
        "png" => png::png_size(path),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

/// Saves `img` in the given output format, converting pixel depth as needed.
/// `Mono32F` input is assumed to be clamped to `[0, 1]`.
pub fn save_image(path: &Path, img: &Image, format: OutputFormat) -> Result<()> {
    let target = format.pixel_format();
    let converted;
    let img = if img.format() == target {
        img
    } else {
        converted = img.convert_pixel_format(target, None)?;
        &converted
    };
    match format {
        OutputFormat::Bmp8 => bmp::write_bmp(path, img),
        #[cfg(feature = "png-format")]
        OutputFormat::Png8 => png::write_png(path, img),
        OutputFormat::Tiff8 | OutputFormat::Tiff16 | OutputFormat::Tiff32F => {
            tiff::write_tiff(path, img)
        }
        OutputFormat::Fits8 | OutputFormat::Fits16 | OutputFormat::Fits32F => {
            fits::write_fits(path, img)
        }
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn gradient_mono32f(w: u32, h: u32) -> Image {
        let mut img = Image::new(w, h, PixelFormat::Mono32F).unwrap();
        for y in 0..h {
            for x in 0..w as usize {
                img.row_mut::<f32>(y)[x] = (x as f32 + y as f32) / (w + h) as f32;
            }
        }
        img
    }

    #[test]
    fn save_load_roundtrip_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let img = gradient_mono32f(31, 17);

        let mut formats: Vec<(OutputFormat, f32)> = vec![
            (OutputFormat::Bmp8, 1.0 / 255.0),
            (OutputFormat::Tiff8, 1.0 / 255.0),
            (OutputFormat::Tiff16, 1.0 / 65535.0),
            (OutputFormat::Tiff32F, 0.0),
            (OutputFormat::Fits8, 1.0 / 255.0),
            (OutputFormat::Fits16, 1.0 / 65535.0),
            (OutputFormat::Fits32F, 0.0),
        ];
        #[cfg(feature = "png-format")]
        formats.push((OutputFormat::Png8, 1.0 / 255.0));

        for &(format, tolerance) in &formats {
            let path = dir
                .path()
                .join(format!("img_{:?}.{}", format, format.extension()));
            save_image(&path, &img, format).unwrap();

            assert_eq!(image_size(&path).unwrap(), (31, 17), "{format:?}");

            let restored = load_image_as_mono32f(&path, false).unwrap();
            assert_eq!(restored.width(), 31);
            assert_eq!(restored.height(), 17);
            for y in 0..17 {
                for x in 0..31usize {
                    let a = img.row::<f32>(y)[x];
                    let b = restored.row::<f32>(y)[x];
                    assert!(
                        (a - b).abs() <= tolerance + 1e-7,
                        "{format:?} at ({x}, {y}): {a} vs {b}"
                    );
                }
            }
        }
    }

    #[test]
    fn unknown_extension_rejected() {
        assert!(matches!(
            load_image(Path::new("image.xyz"), true),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn mono8_load_stretches_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dim.tif");
        let mut img = Image::new(4, 1, PixelFormat::Mono32F).unwrap();
        img.pixels_mut::<f32>()
            .copy_from_slice(&[0.2, 0.3, 0.4, 0.5]);
        save_image(&path, &img, OutputFormat::Tiff32F).unwrap();

        let m8 = load_image_as_mono8(&path, false).unwrap();
        assert_eq!(m8.row::<u8>(0)[0], 0);
        assert_eq!(m8.row::<u8>(0)[3], 255);
    }
}
