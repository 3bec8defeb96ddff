// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::error::{Error, Result};

mod convert;
mod transform;

pub use transform::resize_and_translate;

/// Supported pixel formats. Internal processing uses [`PixelFormat::Mono32F`]
/// with a nominal `[0, 1]` value range; out-of-range values are valid
/// intermediates and are clamped before display or save.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PixelFormat {
    Mono8,
    Mono16,
    Mono32F,
    /// 8-bit palettised; the palette holds 256 RGB entries.
    Pal8,
    Rgb8,
    Rgb16,
    Rgba8,
    Rgba16,
    Rgb32F,
    Rgba32F,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Mono16 | PixelFormat::Mono32F | PixelFormat::Pal8 => {
                1
            }
            PixelFormat::Rgb8 | PixelFormat::Rgb16 | PixelFormat::Rgb32F => 3,
            PixelFormat::Rgba8 | PixelFormat::Rgba16 | PixelFormat::Rgba32F => 4,
        }
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Pal8 | PixelFormat::Rgb8 | PixelFormat::Rgba8 => 1,
            PixelFormat::Mono16 | PixelFormat::Rgb16 | PixelFormat::Rgba16 => 2,
            PixelFormat::Mono32F | PixelFormat::Rgb32F | PixelFormat::Rgba32F => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.channels() * self.bytes_per_channel()
    }

    /// Maximum channel value (1.0 for floating-point formats).
    pub fn max_value(self) -> f32 {
        match self.bytes_per_channel() {
            1 => 0xFF as f32,
            2 => 0xFFFF as f32,
            _ => 1.0,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            PixelFormat::Mono32F | PixelFormat::Rgb32F | PixelFormat::Rgba32F
        )
    }
}

/// Number of RGB entries in a [`PixelFormat::Pal8`] palette.
pub const PALETTE_ENTRIES: usize = 256;

pub type Palette = [u8; 3 * PALETTE_ENTRIES];

/// An axis-aligned rectangle in image coordinates.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `true` if `self` lies fully inside a `width` x `height` area.
    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && (self.x as u64 + self.width as u64) <= width as u64
            && (self.y as u64 + self.height as u64) <= height as u64
    }
}

/// Owns pixel memory. The backing store is `u32`-aligned so that rows of any
/// supported sample type can be viewed without copies.
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u32>,
    byte_len: usize,
    palette: Option<Box<Palette>>,
}

impl Image {
    /// Allocates a zero-filled image.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Image> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize(width, height));
        }
        let byte_len = (width as u64)
            .checked_mul(height as u64)
            .and_then(|n| n.checked_mul(format.bytes_per_pixel() as u64))
            .filter(|&n| n < i64::MAX as u64 / 4)
            .ok_or(Error::ImageSizeTooLarge(width, height))? as usize;
        let words = byte_len.div_ceil(4);
        let mut data = Vec::new();
        data.try_reserve_exact(words)
            .map_err(|_| Error::ImageSizeTooLarge(width, height))?;
        data.resize(words, 0u32);
        Ok(Image {
            width,
            height,
            format,
            data,
            byte_len,
            palette: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_deref()
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = Some(Box::new(palette));
    }

    pub fn clear_to_zero(&mut self) {
        self.data.fill(0);
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.data)[..self.byte_len]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let byte_len = self.byte_len;
        &mut bytemuck::cast_slice_mut(&mut self.data)[..byte_len]
    }

    pub fn row_bytes(&self, y: u32) -> &[u8] {
        debug_assert!(y < self.height);
        let bpr = self.bytes_per_row();
        let start = y as usize * bpr;
        &self.bytes()[start..start + bpr]
    }

    pub fn row_bytes_mut(&mut self, y: u32) -> &mut [u8] {
        debug_assert!(y < self.height);
        let bpr = self.bytes_per_row();
        let start = y as usize * bpr;
        &mut self.bytes_mut()[start..start + bpr]
    }

    /// Typed view of one row. `T` must match the format's channel type.
    pub fn row<T: bytemuck::Pod>(&self, y: u32) -> &[T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.format.bytes_per_channel());
        bytemuck::cast_slice(self.row_bytes(y))
    }

    pub fn row_mut<T: bytemuck::Pod>(&mut self, y: u32) -> &mut [T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.format.bytes_per_channel());
        bytemuck::cast_slice_mut(self.row_bytes_mut(y))
    }

    /// Typed view of the whole pixel buffer.
    pub fn pixels<T: bytemuck::Pod>(&self) -> &[T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.format.bytes_per_channel());
        bytemuck::cast_slice(self.bytes())
    }

    pub fn pixels_mut<T: bytemuck::Pod>(&mut self) -> &mut [T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.format.bytes_per_channel());
        bytemuck::cast_slice_mut(self.bytes_mut())
    }

    pub fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn view(&self, rect: Rect) -> Result<ImageView<'_>> {
        if !rect.fits_in(self.width, self.height) {
            return Err(Error::RectOutOfBounds(
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                self.width,
                self.height,
            ));
        }
        Ok(ImageView { image: self, rect })
    }

    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            image: self,
            rect: self.full_rect(),
        }
    }

    /// Multiplies this image element-wise by `other`; both must be
    /// [`PixelFormat::Mono32F`] and of the same size.
    pub fn multiply(&mut self, other: &Image) {
        assert_eq!(self.format, PixelFormat::Mono32F);
        assert_eq!(other.format, PixelFormat::Mono32F);
        assert_eq!((self.width, self.height), (other.width, other.height));
        let src = other.pixels::<f32>();
        for (dst, s) in self.pixels_mut::<f32>().iter_mut().zip(src) {
            *dst *= s;
        }
    }
}

impl Clone for Image {
    /// Deep copy; the only way to duplicate pixel memory.
    fn clone(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            format: self.format,
            data: self.data.clone(),
            byte_len: self.byte_len,
            palette: self.palette.clone(),
        }
    }
}

impl Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {:?}", self.width, self.height, self.format)
    }
}

/// Non-owning sub-rectangle of an [`Image`]. Never outlives the owner.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    rect: Rect,
}

impl<'a> ImageView<'a> {
    pub fn width(&self) -> u32 {
        self.rect.width
    }

    pub fn height(&self) -> u32 {
        self.rect.height
    }

    pub fn format(&self) -> PixelFormat {
        self.image.format
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn image(&self) -> &'a Image {
        self.image
    }

    pub fn row_bytes(&self, y: u32) -> &'a [u8] {
        debug_assert!(y < self.rect.height);
        let bpp = self.image.format.bytes_per_pixel();
        let full = self.image.row_bytes((self.rect.y as u32) + y);
        let start = self.rect.x as usize * bpp;
        &full[start..start + self.rect.width as usize * bpp]
    }

    pub fn row<T: bytemuck::Pod>(&self, y: u32) -> &'a [T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.image.format.bytes_per_channel());
        bytemuck::cast_slice(self.row_bytes(y))
    }

    /// Copies the viewed rectangle into a newly allocated image.
    pub fn to_image(&self) -> Result<Image> {
        let mut out = Image::new(self.rect.width, self.rect.height, self.image.format)?;
        for y in 0..self.rect.height {
            out.row_bytes_mut(y).copy_from_slice(self.row_bytes(y));
        }
        if let Some(p) = self.image.palette() {
            out.set_palette(*p);
        }
        Ok(out)
    }
}

/// Copies a `src_rect` area of `src` to `dst` at `(dst_x, dst_y)`.
/// Pixel formats of both images must match.
pub fn copy_rect(src: &Image, dst: &mut Image, src_rect: Rect, dst_x: u32, dst_y: u32) {
    assert_eq!(src.format(), dst.format());
    assert!(src_rect.fits_in(src.width(), src.height()));
    assert!(
        dst_x as u64 + src_rect.width as u64 <= dst.width() as u64
            && dst_y as u64 + src_rect.height as u64 <= dst.height() as u64
    );

    let bpp = src.format().bytes_per_pixel();
    for y in 0..src_rect.height {
        let src_row = src.row_bytes(src_rect.y as u32 + y);
        let src_start = src_rect.x as usize * bpp;
        let dst_row = dst.row_bytes_mut(dst_y + y);
        let dst_start = dst_x as usize * bpp;
        dst_row[dst_start..dst_start + src_rect.width as usize * bpp]
            .copy_from_slice(&src_row[src_start..src_start + src_rect.width as usize * bpp]);
    }
}

/// Clamps every sample of a `Mono32F` image to `[0, 1]`.
pub fn clamp_mono32f(img: &mut Image) {
    assert_eq!(img.format(), PixelFormat::Mono32F);
    for v in img.pixels_mut::<f32>() {
        *v = v.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn new_image_is_zeroed() {
        let img = Image::new(7, 3, PixelFormat::Mono8).unwrap();
        assert!(img.bytes().iter().all(|&b| b == 0));
        assert_eq!(img.bytes().len(), 21);
    }

    #[test]
    fn zero_size_rejected() {
        assert!(Image::new(0, 5, PixelFormat::Mono8).is_err());
        assert!(Image::new(5, 0, PixelFormat::Mono32F).is_err());
    }

    #[test]
    fn typed_rows() {
        let mut img = Image::new(4, 2, PixelFormat::Mono32F).unwrap();
        img.row_mut::<f32>(1).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(img.row::<f32>(0), &[0.0; 4]);
        assert_eq!(img.row::<f32>(1), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn view_rows_are_offset() {
        let mut img = Image::new(4, 4, PixelFormat::Mono8).unwrap();
        for y in 0..4 {
            for x in 0..4usize {
                img.row_mut::<u8>(y)[x] = (y * 10) as u8 + x as u8;
            }
        }
        let v = img.view(Rect::new(1, 2, 2, 2)).unwrap();
        assert_eq!(v.row::<u8>(0), &[21, 22]);
        assert_eq!(v.row::<u8>(1), &[31, 32]);
        let owned = v.to_image().unwrap();
        assert_eq!(owned.row::<u8>(1), &[31, 32]);
    }

    #[test]
    fn view_out_of_bounds() {
        let img = Image::new(4, 4, PixelFormat::Mono8).unwrap();
        assert!(img.view(Rect::new(2, 2, 3, 1)).is_err());
        assert!(img.view(Rect::new(-1, 0, 2, 2)).is_err());
    }

    #[test]
    fn copy_rect_moves_pixels() {
        let mut src = Image::new(4, 4, PixelFormat::Mono16).unwrap();
        src.row_mut::<u16>(1)[2] = 777;
        let mut dst = Image::new(3, 3, PixelFormat::Mono16).unwrap();
        copy_rect(&src, &mut dst, Rect::new(2, 1, 2, 2), 0, 0);
        assert_eq!(dst.row::<u16>(0)[0], 777);
    }

    #[test]
    fn multiply_elementwise() {
        let mut a = Image::new(2, 2, PixelFormat::Mono32F).unwrap();
        let mut b = Image::new(2, 2, PixelFormat::Mono32F).unwrap();
        a.pixels_mut::<f32>().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        b.pixels_mut::<f32>().copy_from_slice(&[0.5, 0.5, 2.0, 0.0]);
        a.multiply(&b);
        assert_eq!(a.pixels::<f32>(), &[0.5, 1.0, 6.0, 0.0]);
    }
}
