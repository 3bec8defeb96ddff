// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Pixel format conversion. 8<->16-bit scaling is by bit shift, integer<->float
//! scaling is by 0xFF / 0xFFFF, and color to mono uses the channel mean.

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat, Rect};

impl Image {
    /// Converts `rect` (or the whole image) to `dest_format`. Converting the
    /// full image to the same format is a deep copy. Conversions *to* `Pal8`
    /// are not supported.
    pub fn convert_pixel_format(
        &self,
        dest_format: PixelFormat,
        rect: Option<Rect>,
    ) -> Result<Image> {
        let rect = rect.unwrap_or_else(|| self.full_rect());
        if !rect.fits_in(self.width(), self.height()) {
            return Err(Error::RectOutOfBounds(
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                self.width(),
                self.height(),
            ));
        }
        if dest_format == PixelFormat::Pal8 && self.format() != PixelFormat::Pal8 {
            return Err(Error::UnsupportedConversion(self.format(), dest_format));
        }

        if self.format() == dest_format {
            return self.view(rect)?.to_image();
        }

        let mut dest = Image::new(rect.width, rect.height, dest_format)?;
        for y in 0..rect.height {
            let src_y = rect.y as u32 + y;
            for x in 0..rect.width as usize {
                let src_x = rect.x as usize + x;
                convert_pixel(self, src_y, src_x, &mut dest, y, x)?;
            }
        }
        Ok(dest)
    }
}

fn convert_pixel(
    src: &Image,
    sy: u32,
    sx: usize,
    dest: &mut Image,
    dy: u32,
    dx: usize,
) -> Result<()> {
    use PixelFormat::*;

    let sf = src.format();
    let df = dest.format();

    // Every source pixel is expanded to mono8/mono16/mono32f/rgb16 once; the
    // destination then narrows it with the scaling rules above.
    let (m8, m16, m32f, rgb16): (u8, u16, f32, [u16; 3]) = match sf {
        Mono8 => {
            let v = src.row::<u8>(sy)[sx];
            (
                v,
                (v as u16) << 8,
                v as f32 / 0xFF as f32,
                [(v as u16) << 8; 3],
            )
        }
        Mono16 => {
            let v = src.row::<u16>(sy)[sx];
            ((v >> 8) as u8, v, v as f32 / 0xFFFF as f32, [v; 3])
        }
        Mono32F => {
            let v = src.row::<f32>(sy)[sx];
            (
                (v * 0xFF as f32) as u8,
                (v * 0xFFFF as f32) as u16,
                v,
                [(v * 0xFFFF as f32) as u16; 3],
            )
        }
        Pal8 => {
            let palette = src
                .palette()
                .ok_or(Error::UnsupportedConversion(sf, df))?;
            let idx = src.row::<u8>(sy)[sx] as usize;
            let (r, g, b) = (
                palette[3 * idx] as u32,
                palette[3 * idx + 1] as u32,
                palette[3 * idx + 2] as u32,
            );
            let sum = r + g + b;
            (
                (sum / 3) as u8,
                (sum / 3) as u16,
                sum as f32 / (3 * 0xFF) as f32,
                [(r as u16) << 8, (g as u16) << 8, (b as u16) << 8],
            )
        }
        Rgb8 | Rgba8 => {
            let ch = sf.channels();
            let row = src.row::<u8>(sy);
            let (r, g, b) = (
                row[sx * ch] as u32,
                row[sx * ch + 1] as u32,
                row[sx * ch + 2] as u32,
            );
            let sum = r + g + b;
            (
                (sum / 3) as u8,
                (sum / 3) as u16,
                sum as f32 / (3 * 0xFF) as f32,
                [(r as u16) << 8, (g as u16) << 8, (b as u16) << 8],
            )
        }
        Rgb16 | Rgba16 => {
            let ch = sf.channels();
            let row = src.row::<u16>(sy);
            let (r, g, b) = (
                row[sx * ch] as u32,
                row[sx * ch + 1] as u32,
                row[sx * ch + 2] as u32,
            );
            let sum = r + g + b;
            (
                ((sum / 3) >> 8) as u8,
                (sum / 3) as u16,
                sum as f32 / (3 * 0xFFFF) as f32,
                [r as u16, g as u16, b as u16],
            )
        }
        Rgb32F | Rgba32F => {
            let ch = sf.channels();
            let row = src.row::<f32>(sy);
            let (r, g, b) = (row[sx * ch], row[sx * ch + 1], row[sx * ch + 2]);
            let mean = (r + g + b) / 3.0;
            (
                (mean * 0xFF as f32) as u8,
                (mean * 0xFFFF as f32) as u16,
                mean,
                [
                    (r * 0xFFFF as f32) as u16,
                    (g * 0xFFFF as f32) as u16,
                    (b * 0xFFFF as f32) as u16,
                ],
            )
        }
    };

    match df {
        Mono8 => dest.row_mut::<u8>(dy)[dx] = m8,
        Mono16 => dest.row_mut::<u16>(dy)[dx] = m16,
        Mono32F => dest.row_mut::<f32>(dy)[dx] = m32f,
        Rgb8 => {
            let row = dest.row_mut::<u8>(dy);
            for c in 0..3 {
                row[dx * 3 + c] = (rgb16[c] >> 8) as u8;
            }
        }
        Rgb16 => {
            let row = dest.row_mut::<u16>(dy);
            row[dx * 3..dx * 3 + 3].copy_from_slice(&rgb16);
        }
        Rgb32F => {
            let row = dest.row_mut::<f32>(dy);
            for c in 0..3 {
                row[dx * 3 + c] = rgb16[c] as f32 / 0xFFFF as f32;
            }
        }
        Pal8 | Rgba8 | Rgba16 | Rgba32F => {
            return Err(Error::UnsupportedConversion(sf, df));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn mono8_to_mono16_shifts() {
        let mut img = Image::new(2, 1, PixelFormat::Mono8).unwrap();
        img.row_mut::<u8>(0).copy_from_slice(&[0x12, 0xFF]);
        let out = img.convert_pixel_format(PixelFormat::Mono16, None).unwrap();
        assert_eq!(out.row::<u16>(0), &[0x1200, 0xFF00]);
    }

    #[test]
    fn mono16_roundtrips_through_mono8_high_byte() {
        let mut img = Image::new(1, 1, PixelFormat::Mono16).unwrap();
        img.row_mut::<u16>(0)[0] = 0xABCD;
        let out = img.convert_pixel_format(PixelFormat::Mono8, None).unwrap();
        assert_eq!(out.row::<u8>(0)[0], 0xAB);
    }

    #[test]
    fn mono8_to_float_and_back() {
        let mut img = Image::new(1, 1, PixelFormat::Mono8).unwrap();
        img.row_mut::<u8>(0)[0] = 0xFF;
        let f = img.convert_pixel_format(PixelFormat::Mono32F, None).unwrap();
        assert_eq!(f.row::<f32>(0)[0], 1.0);
        let back = f.convert_pixel_format(PixelFormat::Mono8, None).unwrap();
        assert_eq!(back.row::<u8>(0)[0], 0xFF);
    }

    #[test]
    fn rgb_to_mono_is_channel_mean() {
        let mut img = Image::new(1, 1, PixelFormat::Rgb8).unwrap();
        img.row_mut::<u8>(0).copy_from_slice(&[30, 60, 90]);
        let out = img.convert_pixel_format(PixelFormat::Mono8, None).unwrap();
        assert_eq!(out.row::<u8>(0)[0], 60);
    }

    #[test]
    fn pal8_expands_through_palette() {
        let mut img = Image::new(1, 1, PixelFormat::Pal8).unwrap();
        let mut palette = [0u8; 768];
        palette[3] = 10;
        palette[4] = 20;
        palette[5] = 30;
        img.set_palette(palette);
        img.row_mut::<u8>(0)[0] = 1;
        let rgb = img.convert_pixel_format(PixelFormat::Rgb8, None).unwrap();
        assert_eq!(rgb.row::<u8>(0), &[10, 20, 30]);
        let mono = img.convert_pixel_format(PixelFormat::Mono8, None).unwrap();
        assert_eq!(mono.row::<u8>(0)[0], 20);
    }

    #[test]
    fn subrect_conversion() {
        let mut img = Image::new(4, 4, PixelFormat::Mono8).unwrap();
        img.row_mut::<u8>(2)[3] = 128;
        let out = img
            .convert_pixel_format(PixelFormat::Mono32F, Some(Rect::new(3, 2, 1, 1)))
            .unwrap();
        assert_eq!(out.width(), 1);
        assert!((out.row::<f32>(0)[0] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn to_pal8_rejected() {
        let img = Image::new(1, 1, PixelFormat::Mono8).unwrap();
        assert!(img.convert_pixel_format(PixelFormat::Pal8, None).is_err());
    }
}
