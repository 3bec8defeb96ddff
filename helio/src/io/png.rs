// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! 8-bit grayscale PNG reading and writing.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};

fn png_error(path: &Path) -> Error {
    Error::UnsupportedFormat(path.display().to_string())
}

pub fn png_size(path: &Path) -> Result<(u32, u32)> {
    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let reader = decoder.read_info().map_err(|_| png_error(path))?;
    let info = reader.info();
    Ok((info.width, info.height))
}

pub fn read_png(path: &Path) -> Result<Image> {
    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let mut reader = decoder.read_info().map_err(|_| png_error(path))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).map_err(|_| png_error(path))?;

    let format = match (info.color_type, info.bit_depth) {
        (png::ColorType::Grayscale, png::BitDepth::Eight) => PixelFormat::Mono8,
        (png::ColorType::Rgb, png::BitDepth::Eight) => PixelFormat::Rgb8,
        _ => return Err(png_error(path)),
    };

    let mut img = Image::new(info.width, info.height, format)?;
    let bpr = img.bytes_per_row();
    for y in 0..info.height {
        let start = y as usize * info.line_size;
        img.row_bytes_mut(y)
            .copy_from_slice(&buf[start..start + bpr]);
    }
    Ok(img)
}

/// Writes a `Mono8` image as an 8-bit grayscale PNG.
pub fn write_png(path: &Path, img: &Image) -> Result<()> {
    assert_eq!(img.format(), PixelFormat::Mono8);

    let w = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(w, img.width(), img.height());
    encoder.set_color(png::ColorType::Grayscale);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|_| Error::FileWrite(path.to_path_buf()))?;
    writer
        .write_image_data(img.bytes())
        .map_err(|_| Error::FileWrite(path.to_path_buf()))?;
    Ok(())
}
