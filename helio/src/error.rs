// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use thiserror::Error;

use crate::image::PixelFormat;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file or image type: {0}")]
    UnsupportedFormat(String),
    #[error("Unsupported pixel format conversion: {0:?} -> {1:?}")]
    UnsupportedConversion(PixelFormat, PixelFormat),
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(u32, u32),
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(u32, u32),
    #[error("Rect {0}x{1}+{2}+{3} out of bounds of {4}x{5} image")]
    RectOutOfBounds(u32, u32, i32, i32, u32, u32),
    #[error("Empty selection")]
    EmptySelection,
    #[error("Dimension {0} is not a power of two")]
    NotPowerOfTwo(usize),
    #[error("Subpixel translation is not supported for palettised images")]
    PalettisedSubpixel,
    #[error("Circle fit did not converge")]
    CircleFitDiverged,
    #[error("Could not find the limb in {0}")]
    LimbNotFound(PathBuf),
    #[error("Could not determine a valid disc radius in every image")]
    DiscRadiusSpread,
    #[error("Processing aborted")]
    Cancelled,
    #[error("Could not parse settings file: {0}")]
    SettingsParse(String),
    #[error("Could not read {0}")]
    FileRead(PathBuf),
    #[error("Failed to save output file: {0}")]
    FileWrite(PathBuf),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::SettingsParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
