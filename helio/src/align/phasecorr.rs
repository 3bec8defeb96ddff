// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Translation estimation via phase correlation and the frame alignment
//! built on it.

use num_complex::Complex32;
use tracing::debug;

use crate::align::{
    AlignmentEvent, AlignmentInput, AlignmentParams, CropMode, ImageAccessor, JobContext,
};
use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat, Rect, resize_and_translate};
use crate::io;
use crate::math::fft::{cross_power_spectrum, fft_2d, fft_inv_2d};
use crate::util::next_pow2;

/// Blackman window with a 1.0 peak at `x = 1` and zero at `x = 0`.
#[inline]
fn blackman(x: f32) -> f32 {
    const A0: f32 = 7938.0 / 18608.0;
    const A1: f32 = 9240.0 / 18608.0;
    const A2: f32 = 1430.0 / 18608.0;
    A0 - A1 * (std::f32::consts::PI * x).cos() + A2 * (2.0 * std::f32::consts::PI * x).cos()
}

/// Separable radial Blackman window as a `Mono32F` image: 1.0 in the
/// center, tapering to zero at the borders. Without it the frame edges
/// would flood the cross-correlation with false peaks.
pub fn calc_window_function(width: u32, height: u32) -> Image {
    let mut result =
        Image::new(width, height, PixelFormat::Mono32F).expect("window size is valid");
    let (w, h) = (width as usize, height as usize);
    let (half_w, half_h) = (w as f32 * 0.5, h as f32 * 0.5);

    // The window is symmetric in both axes; fill from one quarter.
    for y in 0..h / 2 {
        for x in 0..w / 2 {
            let dx = (x as f32 - half_w) / half_w;
            let dy = (y as f32 - half_h) / half_h;
            let dist = dx * dx + dy * dy;
            let value = if dist < 1.0 { blackman(1.0 - dist) } else { 0.0 };

            let (xr, yr) = (w - 1 - x, h - 1 - y);
            result.row_mut::<f32>(y as u32)[x] = value;
            result.row_mut::<f32>(y as u32)[xr] = value;
            result.row_mut::<f32>(yr as u32)[x] = value;
            result.row_mut::<f32>(yr as u32)[xr] = value;
        }
    }
    result
}

/// Finds the translation of the frame behind `fft2` relative to the frame
/// behind `fft1` from the peak of the inverse-transformed cross-power
/// spectrum; the peak index is folded into `[-N/2, N/2)`.
fn determine_image_translation(
    n_width: usize,
    n_height: usize,
    fft1: &[Complex32],
    fft2: &[Complex32],
    subpixel: bool,
) -> Result<(f32, f32)> {
    let n = n_width * n_height;
    let mut cps = vec![Complex32::default(); n];
    let mut cc = vec![Complex32::default(); n];
    cross_power_spectrum(fft1, fft2, &mut cps);
    fft_inv_2d(&cps, n_height, n_width, &mut cc)?;

    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut max_val = f32::MIN;
    for y in 0..n_height {
        for x in 0..n_width {
            let v = cc[x + y * n_width].re;
            if v > max_val {
                max_val = v;
                max_x = x;
                max_y = y;
            }
        }
    }

    let tx = if max_x < n_width / 2 {
        max_x as i32
    } else {
        max_x as i32 - n_width as i32
    };
    let ty = if max_y < n_height / 2 {
        max_y as i32
    } else {
        max_y as i32 - n_height as i32
    };

    let mut sub_dx = 0.0f32;
    let mut sub_dy = 0.0f32;
    if subpixel {
        // Peak-neighborhood refinement after Foroosh, Zerubia & Berthod.
        let wrap_x = |k: i64| ((k + n_width as i64) % n_width as i64) as usize;
        let wrap_y = |k: i64| ((k + n_height as i64) % n_height as i64) as usize;

        let cc_at = |x: usize, y: usize| cc[x + y * n_width].re;
        let cc_peak = cc_at(max_x, max_y);
        let cc_x_hi = cc_at(wrap_x(max_x as i64 + 1), max_y);
        let cc_x_lo = cc_at(wrap_x(max_x as i64 - 1), max_y);
        let cc_y_hi = cc_at(max_x, wrap_y(max_y as i64 + 1));
        let cc_y_lo = cc_at(max_x, wrap_y(max_y as i64 - 1));

        // Of the two candidate fractions, accept the one in (0, 1); the
        // sign follows the larger neighbor.
        let frac = |neighbor: f32| -> f32 {
            let d1 = neighbor / (neighbor + cc_peak);
            let d2 = neighbor / (neighbor - cc_peak);
            if d1 > 0.0 && d1 < 1.0 {
                d1
            } else if d2 > 0.0 && d2 < 1.0 {
                d2
            } else {
                0.0
            }
        };

        sub_dx = if cc_x_hi > cc_x_lo {
            frac(cc_x_hi)
        } else {
            -frac(cc_x_lo)
        };
        sub_dy = if cc_y_hi > cc_y_lo {
            frac(cc_y_hi)
        } else {
            -frac(cc_y_lo)
        };
    }

    Ok((tx as f32 + sub_dx, ty as f32 + sub_dy))
}

/// Translation between two equal, power-of-two-sized `Mono32F` images that
/// have already been multiplied by the window function.
pub fn determine_translation_vector(img1: &Image, img2: &Image) -> Result<(f32, f32)> {
    assert_eq!(img1.width(), img2.width());
    assert_eq!(img1.height(), img2.height());

    let (w, h) = (img1.width() as usize, img1.height() as usize);
    let mut fft1 = vec![Complex32::default(); w * h];
    let mut fft2 = vec![Complex32::default(); w * h];
    fft_2d(img1.pixels::<f32>(), h, w, &mut fft1)?;
    fft_2d(img2.pixels::<f32>(), h, w, &mut fft2)?;

    determine_image_translation(w, h, &fft1, &fft2, true)
}

fn load_frame<'a>(
    input: &'a AlignmentInput,
    index: usize,
    normalize_fits: bool,
) -> Result<ImageAccessor<'a>> {
    match input {
        AlignmentInput::Files(files) => Ok(ImageAccessor::Owned(io::load_image_as_mono32f(
            &files[index],
            normalize_fits,
        )?)),
        AlignmentInput::Images(images) => Ok(ImageAccessor::Borrowed(&images[index])),
    }
}

fn frame_size(input: &AlignmentInput, index: usize) -> Result<(u32, u32)> {
    match input {
        AlignmentInput::Files(files) => io::image_size(&files[index]),
        AlignmentInput::Images(images) => {
            let img = &images[index];
            Ok((img.width(), img.height()))
        }
    }
}

/// Pastes a frame centered into the `n_width` x `n_height` working buffer,
/// applies the window and transforms it.
fn windowed_fft(
    frame: &Image,
    window: &Image,
    work: &mut Image,
    fft: &mut [Complex32],
) -> Result<()> {
    let (nw, nh) = (work.width(), work.height());
    resize_and_translate(
        frame,
        work,
        frame.full_rect(),
        ((nw - frame.width()) / 2) as f32,
        ((nh - frame.height()) / 2) as f32,
        true,
    )?;
    work.multiply(window);
    fft_2d(work.pixels::<f32>(), nh as usize, nw as usize, fft)
}

pub(crate) struct TranslationSet {
    /// Cumulative translation of each frame relative to the first.
    pub translations: Vec<(f32, f32)>,
    pub sizes: Vec<(u32, u32)>,
    /// Bounding box of all frames, in working-buffer coordinates (an
    /// untranslated frame starts at ((N - w)/2, (N - h)/2)).
    pub bounding_box: Rect,
    pub intersection: Rect,
    pub n_width: u32,
    pub n_height: u32,
}

/// Determines the translation vectors of the whole sequence, reporting one
/// event per frame.
pub(crate) fn determine_translation_vectors(
    params: &AlignmentParams,
    ctx: &JobContext,
) -> Result<TranslationSet> {
    let count = params.input.len();
    if count == 0 {
        return Err(Error::EmptySelection);
    }

    let mut sizes = Vec::with_capacity(count);
    let mut max_w = 0u32;
    let mut max_h = 0u32;
    for i in 0..count {
        let size = frame_size(&params.input, i)?;
        max_w = max_w.max(size.0);
        max_h = max_h.max(size.1);
        sizes.push(size);
    }

    let n_width = next_pow2(max_w);
    let n_height = next_pow2(max_h);
    let n = (n_width * n_height) as usize;

    let window = calc_window_function(n_width, n_height);
    let mut work = Image::new(n_width, n_height, PixelFormat::Mono32F)?;
    let mut prev_fft = vec![Complex32::default(); n];
    let mut curr_fft = vec![Complex32::default(); n];

    let first = load_frame(&params.input, 0, params.normalize_fits_values)?;
    let first_img = first.get().ok_or(Error::EmptySelection)?;
    debug!("computing FFT of frame 0");
    windowed_fft(first_img, &window, &mut work, &mut prev_fft)?;
    drop(first);

    let mut translations = vec![(0.0f32, 0.0f32)];

    // Bounding box and intersection, tracked in working-buffer coordinates;
    // translations are applied rounded towards zero, matching the output
    // translation step.
    let start0 = (
        ((n_width - sizes[0].0) / 2) as i32,
        ((n_height - sizes[0].1) / 2) as i32,
    );
    let mut bb_min = start0;
    let mut bb_max = (
        start0.0 + sizes[0].0 as i32 - 1,
        start0.1 + sizes[0].1 as i32 - 1,
    );
    let mut is_min = start0;
    let mut is_max = bb_max;

    for i in 1..count {
        ctx.check_abort()?;

        let frame = load_frame(&params.input, i, params.normalize_fits_values)?;
        let img = frame.get().ok_or(Error::EmptySelection)?;
        debug!("computing FFT of frame {i}");
        windowed_fft(img, &window, &mut work, &mut curr_fft)?;
        drop(frame);

        let delta = determine_image_translation(
            n_width as usize,
            n_height as usize,
            &prev_fft,
            &curr_fft,
            params.subpixel_alignment,
        )?;

        let prev = *translations.last().unwrap();
        let total = (prev.0 + delta.0, prev.1 + delta.1);
        translations.push(total);

        let (int_tx, int_ty) = (total.0.trunc() as i32, total.1.trunc() as i32);
        let start = (
            ((n_width - sizes[i].0) / 2) as i32 - int_tx,
            ((n_height - sizes[i].1) / 2) as i32 - int_ty,
        );
        let end = (
            start.0 + sizes[i].0 as i32 - 1,
            start.1 + sizes[i].1 as i32 - 1,
        );
        bb_min = (bb_min.0.min(start.0), bb_min.1.min(start.1));
        bb_max = (bb_max.0.max(end.0), bb_max.1.max(end.1));
        is_min = (is_min.0.max(start.0), is_min.1.max(start.1));
        is_max = (is_max.0.min(end.0), is_max.1.min(end.1));

        std::mem::swap(&mut prev_fft, &mut curr_fft);

        ctx.send(AlignmentEvent::PhaseCorrImgTranslation {
            index: i,
            translation: total,
        });
    }

    if is_max.0 < is_min.0 || is_max.1 < is_min.1 {
        return Err(Error::EmptySelection);
    }

    Ok(TranslationSet {
        translations,
        sizes,
        bounding_box: Rect::new(
            bb_min.0,
            bb_min.1,
            (bb_max.0 - bb_min.0 + 1) as u32,
            (bb_max.1 - bb_min.1 + 1) as u32,
        ),
        intersection: Rect::new(
            is_min.0,
            is_min.1,
            (is_max.0 - is_min.0 + 1) as u32,
            (is_max.1 - is_min.1 + 1) as u32,
        ),
        n_width,
        n_height,
    })
}

/// Loads one input file, translates it (subpixel-capable) into a canvas of
/// the output size and saves it.
pub(crate) fn save_translated_output_image(
    params: &AlignmentParams,
    input_path: &std::path::Path,
    output_size: (u32, u32),
    tx: f32,
    ty: f32,
) -> Result<()> {
    let mut src = io::load_image(input_path, params.normalize_fits_values)?;
    // Subpixel translation of palettised images is unsupported; expand.
    if src.format() == PixelFormat::Pal8 {
        src = src.convert_pixel_format(PixelFormat::Rgb8, None)?;
    }

    let mut output = Image::new(output_size.0, output_size.1, src.format())?;
    resize_and_translate(&src, &mut output, src.full_rect(), tx, ty, true)?;

    let is_fits = matches!(
        input_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref(),
        Some("fit") | Some("fits")
    );
    let out_path = crate::align::output_path(params, input_path);
    if is_fits {
        io::fits::write_fits(&out_path, &output)?;
    } else {
        let tiff_ready = matches!(
            output.format(),
            PixelFormat::Mono8 | PixelFormat::Mono16 | PixelFormat::Mono32F
        );
        if tiff_ready {
            io::tiff::write_tiff(&out_path, &output)?;
        } else {
            let mono = output.convert_pixel_format(PixelFormat::Mono8, None)?;
            io::tiff::write_tiff(&out_path, &mono)?;
        }
    }
    Ok(())
}

/// The complete phase-correlation alignment job.
pub(crate) fn align_phase_correlation(params: &AlignmentParams, ctx: &JobContext) -> Result<()> {
    let set = determine_translation_vectors(params, ctx)?;

    let AlignmentInput::Files(files) = &params.input else {
        // In-memory sequences: the translation events are the result.
        return Ok(());
    };

    let (origin, out_w, out_h) = match params.crop_mode {
        CropMode::CropToIntersection => (
            (set.intersection.x, set.intersection.y),
            set.intersection.width,
            set.intersection.height,
        ),
        CropMode::PadToBoundingBox => (
            (set.bounding_box.x, set.bounding_box.y),
            set.bounding_box.width,
            set.bounding_box.height,
        ),
    };

    for (i, path) in files.iter().enumerate() {
        ctx.check_abort()?;

        let mut tx =
            ((set.n_width - set.sizes[i].0) / 2) as f32 - set.translations[i].0 - origin.0 as f32;
        let mut ty =
            ((set.n_height - set.sizes[i].1) / 2) as f32 - set.translations[i].1 - origin.1 as f32;
        if !params.subpixel_alignment {
            tx = tx.round();
            ty = ty.round();
        }

        save_translated_output_image(params, path, (out_w, out_h), tx, ty)?;
        ctx.send(AlignmentEvent::SavedOutputImage { index: i });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    use crate::math::gaussian::{ConvolutionMethod, convolve_separable};

    /// Smooth random test frame (band-limited enough for subpixel work).
    fn bandlimited_frame(w: u32, h: u32, seed: u64) -> Image {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let noise: Vec<f32> = (0..w * h).map(|_| rng.random::<f32>()).collect();
        let mut smooth = vec![0.0f32; (w * h) as usize];
        convolve_separable(
            &noise,
            w as usize,
            h as usize,
            &mut smooth,
            2.0,
            ConvolutionMethod::Standard,
        );
        let mut img = Image::new(w, h, PixelFormat::Mono32F).unwrap();
        img.pixels_mut::<f32>().copy_from_slice(&smooth);
        img
    }

    #[test]
    fn window_function_shape() {
        let wnd = calc_window_function(64, 64);
        let center = wnd.row::<f32>(32)[32];
        assert!(center > 0.98);
        assert_eq!(wnd.row::<f32>(0)[0], 0.0);
        assert_eq!(wnd.row::<f32>(63)[63], 0.0);
        // Symmetry.
        assert_eq!(wnd.row::<f32>(10)[5], wnd.row::<f32>(10)[58]);
        assert_eq!(wnd.row::<f32>(5)[10], wnd.row::<f32>(58)[10]);
    }

    fn windowed(img: &Image) -> Image {
        let wnd = calc_window_function(img.width(), img.height());
        let mut out = img.clone();
        out.multiply(&wnd);
        out
    }

    #[test]
    fn recovers_integer_translation_exactly() {
        let base = bandlimited_frame(128, 128, 5);
        let mut shifted = Image::new(128, 128, PixelFormat::Mono32F).unwrap();
        resize_and_translate(&base, &mut shifted, base.full_rect(), 7.0, -4.0, true).unwrap();

        let t = determine_translation_vector(&windowed(&base), &windowed(&shifted)).unwrap();
        assert_eq!(t.0.round() as i32, 7);
        assert_eq!(t.1.round() as i32, -4);
    }

    #[test]
    fn recovers_fractional_translation() {
        let base = bandlimited_frame(128, 128, 6);
        let mut shifted = Image::new(128, 128, PixelFormat::Mono32F).unwrap();
        resize_and_translate(&base, &mut shifted, base.full_rect(), 3.5, -2.25, true).unwrap();

        let t = determine_translation_vector(&windowed(&base), &windowed(&shifted)).unwrap();
        assert!((t.0 - 3.5).abs() < 0.05, "tx = {}", t.0);
        assert!((t.1 + 2.25).abs() < 0.05, "ty = {}", t.1);
    }
}
