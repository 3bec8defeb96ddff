// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Image translation with cropping/zero-padding and optional subpixel offsets.

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat, Rect};
use crate::util::for_each_row_mut;

/// A sample type the bicubic interpolator can run over.
pub(crate) trait Sample: bytemuck::Pod + Send + Sync {
    const MAX: f32;
    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl Sample for u8 {
    const MAX: f32 = 0xFF as f32;
    fn to_f32(self) -> f32 {
        self as f32
    }
    fn from_f32(v: f32) -> u8 {
        v as u8
    }
}

impl Sample for u16 {
    const MAX: f32 = 0xFFFF as f32;
    fn to_f32(self) -> f32 {
        self as f32
    }
    fn from_f32(v: f32) -> u16 {
        v as u16
    }
}

impl Sample for f32 {
    const MAX: f32 = 1.0;
    fn to_f32(self) -> f32 {
        self
    }
    fn from_f32(v: f32) -> f32 {
        v
    }
}

/// Cubic Hermite interpolation of 4 consecutive samples at `0 <= t <= 1`
/// between the middle two; endpoint derivatives are the centered differences.
#[inline]
fn interpolate_cubic(t: f32, fm1: f32, f0: f32, f1: f32, f2: f32) -> f32 {
    let delta = f1 - f0;
    let dk = (f1 - fm1) * 0.5;
    let dk1 = (f2 - f0) * 0.5;

    let a0 = f0;
    let a1 = dk;
    let a2 = 3.0 * delta - 2.0 * dk - dk1;
    let a3 = dk + dk1 - 2.0 * delta;

    t * (t * (a3 * t + a2) + a1) + a0
}

/// Copies `src_rect` of `src` into `dest` with its origin at the (possibly
/// fractional) offset `(x_ofs, y_ofs)`; the area is cropped or padded to the
/// destination size. There is no scaling. Integer translations are row
/// copies; fractional ones use separable bicubic interpolation, with the
/// 2-pixel border of the target area copied unchanged. When `clear_to_zero`
/// is set, destination pixels outside the target area are zero-filled.
///
/// Subpixel translation of palettised images is not supported; convert to
/// `Rgb8` first.
pub fn resize_and_translate(
    src: &Image,
    dest: &mut Image,
    src_rect: Rect,
    x_ofs: f32,
    y_ofs: f32,
    clear_to_zero: bool,
) -> Result<()> {
    if src.format() != dest.format() {
        return Err(Error::UnsupportedConversion(src.format(), dest.format()));
    }
    if !src_rect.fits_in(src.width(), src.height()) || src_rect.is_empty() {
        return Err(Error::RectOutOfBounds(
            src_rect.width,
            src_rect.height,
            src_rect.x,
            src_rect.y,
            src.width(),
            src.height(),
        ));
    }

    let x_frac = x_ofs.fract();
    let y_frac = y_ofs.fract();
    let subpixel = x_frac != 0.0 || y_frac != 0.0;
    if subpixel && src.format() == PixelFormat::Pal8 {
        return Err(Error::PalettisedSubpixel);
    }

    match src.format().bytes_per_channel() {
        1 => translate_impl::<u8>(src, dest, src_rect, x_ofs, y_ofs, clear_to_zero),
        2 => translate_impl::<u16>(src, dest, src_rect, x_ofs, y_ofs, clear_to_zero),
        _ => translate_impl::<f32>(src, dest, src_rect, x_ofs, y_ofs, clear_to_zero),
    }
    Ok(())
}

fn translate_impl<T: Sample>(
    src: &Image,
    dest: &mut Image,
    src_rect: Rect,
    x_ofs: f32,
    y_ofs: f32,
    clear_to_zero: bool,
) {
    let x_ofs_int = x_ofs.trunc() as i64;
    let y_ofs_int = y_ofs.trunc() as i64;
    let mut x_frac = x_ofs.fract();
    let mut y_frac = y_ofs.fract();

    let bpp = src.format().bytes_per_pixel();
    let dw = dest.width() as i64;
    let dh = dest.height() as i64;

    // Destination span (inclusive) receiving source data.
    let dest_x_start = x_ofs_int.max(0);
    let dest_y_start = y_ofs_int.max(0);
    let dest_x_end = (x_ofs_int + src_rect.width as i64 - 1).min(dw - 1);
    let dest_y_end = (y_ofs_int + src_rect.height as i64 - 1).min(dh - 1);

    if dest_x_end < dest_x_start || dest_y_end < dest_y_start {
        if clear_to_zero {
            dest.clear_to_zero();
        }
        return;
    }

    if clear_to_zero {
        for y in 0..dest_y_start {
            dest.row_bytes_mut(y as u32).fill(0);
        }
        for y in (dest_y_end + 1)..dh {
            dest.row_bytes_mut(y as u32).fill(0);
        }
        for y in dest_y_start..=dest_y_end {
            let row = dest.row_bytes_mut(y as u32);
            row[..dest_x_start as usize * bpp].fill(0);
            row[(dest_x_end + 1) as usize * bpp..].fill(0);
        }
    }

    // Maps a destination column/row back to the source image.
    let src_x = |dx: i64| (src_rect.x as i64 + dx - x_ofs_int) as usize;
    let src_y = |dy: i64| (src_rect.y as i64 + dy - y_ofs_int) as u32;

    let copy_row_span = |dest: &mut Image, dy: i64, x0: i64, x1: i64| {
        let sy = src_y(dy);
        let sx = src_x(x0);
        let count = (x1 - x0 + 1) as usize;
        let src_row = src.row_bytes(sy);
        let dest_row = dest.row_bytes_mut(dy as u32);
        dest_row[x0 as usize * bpp..(x0 as usize + count) * bpp]
            .copy_from_slice(&src_row[sx * bpp..(sx + count) * bpp]);
    };

    if x_frac == 0.0 && y_frac == 0.0 {
        for dy in dest_y_start..=dest_y_end {
            copy_row_span(&mut *dest, dy, dest_x_start, dest_x_end);
        }
        return;
    }

    // Straight-copy the 2-pixel border of the target area.
    for i in 0..2 {
        if dest_y_start + i <= dest_y_end {
            copy_row_span(&mut *dest, dest_y_start + i, dest_x_start, dest_x_end);
        }
        if dest_y_end - i > dest_y_start + 1 {
            copy_row_span(&mut *dest, dest_y_end - i, dest_x_start, dest_x_end);
        }
    }
    for dy in dest_y_start..=dest_y_end {
        let span = (dest_x_end - dest_x_start + 1).min(2);
        copy_row_span(&mut *dest, dy, dest_x_start, dest_x_start + span - 1);
        if dest_x_end - 1 > dest_x_start + 1 {
            copy_row_span(&mut *dest, dy, dest_x_end - 1, dest_x_end);
        }
    }

    if dest_y_end - dest_y_start < 4 || dest_x_end - dest_x_start < 4 {
        return;
    }

    // Interpolate the interior. A positive fractional offset samples
    // "backwards" in the source, which the index step signs encode.
    let idx: i64 = if x_frac < 0.0 { 1 } else { -1 };
    let idy: i64 = if y_frac < 0.0 { 1 } else { -1 };
    x_frac = x_frac.abs();
    y_frac = y_frac.abs();

    let channels = src.format().channels();
    let width = dest.width() as usize;

    let y0 = (dest_y_start + 2) as usize;
    let y1 = (dest_y_end - 2) as usize;
    let row_len = width * channels;
    let interior = &mut dest.pixels_mut::<T>()[y0 * row_len..(y1 + 1) * row_len];

    for_each_row_mut(interior, row_len, |rel_y, dest_row| {
        let dy = (y0 + rel_y) as i64;
        for dx in (dest_x_start + 2)..=(dest_x_end - 2) {
            for ch in 0..channels {
                let sx = src_x(dx) as i64;
                let mut yvals = [0.0f32; 4];
                for (i, rel) in (-1..=2).enumerate() {
                    let sy = (src_y(dy) as i64 + rel * idy) as u32;
                    let row = src.row::<T>(sy);
                    yvals[i] = interpolate_cubic(
                        x_frac,
                        row[((sx - idx) as usize) * channels + ch].to_f32(),
                        row[(sx as usize) * channels + ch].to_f32(),
                        row[((sx + idx) as usize) * channels + ch].to_f32(),
                        row[((sx + 2 * idx) as usize) * channels + ch].to_f32(),
                    );
                }
                let v = interpolate_cubic(y_frac, yvals[0], yvals[1], yvals[2], yvals[3]);
                dest_row[dx as usize * channels + ch] = T::from_f32(v.clamp(0.0, T::MAX));
            }
        }
    });
}
