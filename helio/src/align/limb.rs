// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Solar-limb alignment: keeps the disc's edge stationary by detecting limb
//! points along rays from the image centroid, fitting circles to them, and
//! smoothing the residual drift by tracking a high-contrast feature.

use tracing::{debug, info};

use crate::align::{AlignmentEvent, AlignmentInput, AlignmentParams, CropMode, JobContext};
use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat, Rect, copy_rect};
use crate::io;
use crate::math::circle::fit_circle;
use crate::math::gaussian::{ConvolutionMethod, convolve_separable};

use super::phasecorr::{
    calc_window_function, determine_translation_vector, save_translated_output_image,
};

/// Sample window length used when locating the limb crossing along a ray.
pub const DIFF_SIZE: usize = 20;
const NUM_RAYS: usize = 64;
/// Candidates steeper than 1/3 of the expected average steepness survive.
const STEEPNESS_DIV: i32 = 3;
/// Max fraction of above-threshold neighbors acceptable for a limb point.
const MAX_ABOVE_THRESHOLD_FRACTION: f32 = 0.6;
/// Side of the (square, power-of-two) stabilization tracking area.
const STBL_AREA_SIZE: u32 = 128;
/// Disc radii of the sequence may differ by at most this factor.
const MAX_RADII_SPREAD: f32 = 1.5;

#[derive(Clone, Copy)]
struct RayPoint {
    x: i32,
    y: i32,
    value: u8,
}

/// Brightness threshold separating the disc from the background, found by
/// iterating the two-class mean split of the histogram until it settles.
/// Also returns the average disc and background brightness.
fn find_disc_background_threshold(img: &Image) -> (u8, u8, u8) {
    assert_eq!(img.format(), PixelFormat::Mono8);

    let mut histogram = [0u64; 256];
    for &v in img.pixels::<u8>() {
        histogram[v as usize] += 1;
    }

    let class_mean = |lo: usize, hi: usize| -> f64 {
        let mut sum = 0u64;
        let mut count = 0u64;
        for (v, &n) in histogram.iter().enumerate().take(hi + 1).skip(lo) {
            sum += v as u64 * n;
            count += n;
        }
        if count == 0 { 0.0 } else { sum as f64 / count as f64 }
    };

    let mut threshold = 128usize;
    for _ in 0..64 {
        let below = class_mean(0, threshold);
        let above = class_mean(threshold + 1, 255);
        let next = ((below + above) / 2.0).round() as usize;
        if next == threshold {
            break;
        }
        threshold = next.min(254);
    }

    (
        threshold as u8,
        class_mean(threshold + 1, 255).round() as u8,
        class_mean(0, threshold).round() as u8,
    )
}

/// Intensity-weighted centroid of a `Mono8` image.
fn calc_centroid(img: &Image) -> (f32, f32) {
    assert_eq!(img.format(), PixelFormat::Mono8);
    let mut sum = 0.0f64;
    let mut sx = 0.0f64;
    let mut sy = 0.0f64;
    for y in 0..img.height() {
        for (x, &v) in img.row::<u8>(y).iter().enumerate() {
            let v = v as f64;
            sum += v;
            sx += v * x as f64;
            sy += v * y as f64;
        }
    }
    if sum == 0.0 {
        (img.width() as f32 / 2.0, img.height() as f32 / 2.0)
    } else {
        ((sx / sum) as f32, (sy / sum) as f32)
    }
}

/// Collects the pixels of a ray from `origin` along `dir` to the image edge.
fn ray_points(origin: (f32, f32), dir: (f32, f32), img: &Image) -> Vec<RayPoint> {
    let len = dir.0.abs().max(dir.1.abs());
    if len == 0.0 {
        return Vec::new();
    }
    let step = (dir.0 / len, dir.1 / len);

    let mut points = Vec::new();
    let mut pos = origin;
    loop {
        let (x, y) = (pos.0.round() as i32, pos.1.round() as i32);
        if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
            break;
        }
        points.push(RayPoint {
            x,
            y,
            value: img.row::<u8>(y as u32)[x as usize],
        });
        pos = (pos.0 + step.0, pos.1 + step.1);
    }
    points
}

/// Finds where `ray` crosses the limb: the position with the steepest
/// transition across `threshold` over a `DIFF_SIZE`-sample window. The
/// steepness is the summed absolute difference across the window,
/// `sum |v[k] - v[k + DIFF_SIZE]|`; for a clean limb it peaks at
/// `DIFF_SIZE * (disc - background)` when the transition sits mid-window.
fn find_limb_crossing(ray: &[RayPoint], threshold: u8) -> Option<((f32, f32), i32)> {
    if ray.len() < 2 * DIFF_SIZE {
        return None;
    }

    let mut best: Option<(usize, i32)> = None;
    for i in 0..=ray.len() - 2 * DIFF_SIZE {
        let inner = ray[i].value;
        let outer = ray[i + 2 * DIFF_SIZE - 1].value;
        if !(inner >= threshold && outer < threshold) {
            continue;
        }
        let steepness: i32 = (i..i + DIFF_SIZE)
            .map(|k| (ray[k].value as i32 - ray[k + DIFF_SIZE].value as i32).abs())
            .sum();
        if best.is_none_or(|(_, s)| steepness > s) {
            best = Some((i, steepness));
        }
    }

    best.map(|(i, steepness)| {
        let crossing = &ray[i + DIFF_SIZE];
        ((crossing.x as f32, crossing.y as f32), steepness)
    })
}

/// Counts the neighbors of `p` within `radius` whose value exceeds the
/// threshold; returns (above, total).
fn count_neighbors_above_threshold(
    p: (f32, f32),
    img: &Image,
    radius: i32,
    threshold: u8,
) -> (usize, usize) {
    let mut above = 0usize;
    let mut total = 0usize;
    let y_lo = (p.1 as i32 - radius).max(0);
    let y_hi = (p.1 as i32 + radius).min(img.height() as i32 - 1);
    let x_lo = (p.0 as i32 - radius).max(0);
    let x_hi = (p.0 as i32 + radius).min(img.width() as i32 - 1);
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            let dx = x as f32 - p.0;
            let dy = y as f32 - p.1;
            if dx * dx + dy * dy <= (radius * radius) as f32 {
                total += 1;
                if img.row::<u8>(y as u32)[x as usize] > threshold {
                    above += 1;
                }
            }
        }
    }
    (above, total)
}

struct DiscDetection {
    limb_points: Vec<Vec<(f32, f32)>>,
    radii: Vec<f32>,
    sizes: Vec<(u32, u32)>,
    centroids: Vec<(f32, f32)>,
}

/// Detects the disc's limb points and radius in every input image.
fn find_radii(files: &[std::path::PathBuf], params: &AlignmentParams, ctx: &JobContext)
-> Result<DiscDetection> {
    let mut detection = DiscDetection {
        limb_points: Vec::with_capacity(files.len()),
        radii: Vec::with_capacity(files.len()),
        sizes: Vec::with_capacity(files.len()),
        centroids: Vec::with_capacity(files.len()),
    };

    for (i, path) in files.iter().enumerate() {
        ctx.check_abort()?;

        let img = io::load_image_as_mono8(path, params.normalize_fits_values)?;
        detection.sizes.push((img.width(), img.height()));

        let (threshold, avg_disc, avg_bkgrnd) = find_disc_background_threshold(&img);
        let centroid = calc_centroid(&img);
        detection.centroids.push(centroid);

        // Trace rays outward from the centroid and find where each one
        // leaves the disc.
        let mut candidates: Vec<((f32, f32), i32)> = Vec::with_capacity(NUM_RAYS);
        for j in 0..NUM_RAYS {
            let angle = j as f32 * 2.0 * std::f32::consts::PI / NUM_RAYS as f32;
            let dir = (angle.cos(), angle.sin());
            let ray = ray_points(centroid, dir, &img);
            if let Some(candidate) = find_limb_crossing(&ray, threshold) {
                candidates.push(candidate);
            }
        }

        // Points with a transition much weaker than expected are likely a
        // prominence edge or a sunspot, not the limb.
        let avg_steepness = DIFF_SIZE as i32 * (avg_disc as i32 - avg_bkgrnd as i32);
        candidates.sort_by_key(|&(_, s)| std::cmp::Reverse(s));
        let mut points: Vec<(f32, f32)> = candidates
            .iter()
            .take_while(|&&(_, s)| s >= avg_steepness / STEEPNESS_DIV)
            .map(|&(p, _)| p)
            .collect();

        // A limb point should see mostly background in its neighborhood;
        // unless most points fail that test, which indicates an overexposed
        // disc with a bright halo.
        let fractions: Vec<f32> = points
            .iter()
            .map(|&p| {
                let (above, total) =
                    count_neighbors_above_threshold(p, &img, DIFF_SIZE as i32, threshold);
                above as f32 / total.max(1) as f32
            })
            .collect();
        let num_exceeding = fractions
            .iter()
            .filter(|&&f| f > MAX_ABOVE_THRESHOLD_FRACTION)
            .count();
        if num_exceeding < 3 * points.len() / 4 {
            let mut kept = Vec::with_capacity(points.len());
            for (p, f) in points.iter().zip(&fractions) {
                if *f <= MAX_ABOVE_THRESHOLD_FRACTION {
                    kept.push(*p);
                }
            }
            points = kept;
        }

        debug!("image {i}: {} limb points used", points.len());
        if points.len() < 3 {
            return Err(Error::LimbNotFound(path.clone()));
        }

        let circle = fit_circle(&points, None, Some(centroid))
            .map_err(|_| Error::LimbNotFound(path.clone()))?;
        detection.radii.push(circle.r);
        detection.limb_points.push(points);

        ctx.send(AlignmentEvent::LimbFoundDiscRadius {
            index: i,
            radius: circle.r,
        });
    }

    Ok(detection)
}

/// Quality of an image area: the sum of squared horizontal and vertical
/// pixel differences, skipping a border that may carry sharpening leftovers.
fn get_quality(img: &Image, area: Rect) -> f32 {
    assert_eq!(img.format(), PixelFormat::Mono32F);
    const BORDER_SKIP: i32 = 3;

    let mut result = 0.0f32;
    for y in BORDER_SKIP..area.height as i32 - BORDER_SKIP - 1 {
        let row = img.row::<f32>((area.y + y) as u32);
        let next_row = img.row::<f32>((area.y + y + 1) as u32);
        for x in BORDER_SKIP..area.width as i32 - BORDER_SKIP - 1 {
            let v00 = row[(area.x + x) as usize];
            let v10 = row[(area.x + x + 1) as usize];
            let v01 = next_row[(area.x + x) as usize];
            result += (v10 - v00) * (v10 - v00) + (v01 - v00) * (v01 - v00);
        }
    }
    result
}

fn blurred_copy(img: &Image, sigma: f32) -> Result<Image> {
    let mut out = Image::new(img.width(), img.height(), PixelFormat::Mono32F)?;
    convolve_separable(
        img.pixels::<f32>(),
        img.width() as usize,
        img.height() as usize,
        out.pixels_mut::<f32>(),
        sigma,
        ConvolutionMethod::Auto,
    );
    Ok(out)
}

/// Extracts a window-multiplied copy of the stabilization area, or fails
/// when the area leaves the image.
fn windowed_area(img: &Image, x0: i32, y0: i32, wnd: &Image) -> Result<Image> {
    let rect = Rect::new(x0, y0, STBL_AREA_SIZE, STBL_AREA_SIZE);
    if !rect.fits_in(img.width(), img.height()) {
        return Err(Error::EmptySelection);
    }
    let mut area = Image::new(STBL_AREA_SIZE, STBL_AREA_SIZE, PixelFormat::Mono32F)?;
    copy_rect(img, &mut area, rect, 0, 0);
    area.multiply(wnd);
    Ok(area)
}

/// Tracks a high-contrast feature through the sequence, fits a circular arc
/// to its track and corrects `translations` so the feature follows the arc.
///
/// Overlaying the disc alone is often not enough for smooth frame-to-frame
/// motion; this mimics what a manual alignment would do with a sunspot or a
/// prominence base. The arc model assumes a smooth monotone track; a track
/// that reverses direction is projected degenerately (accepted limitation).
fn stabilize_limb_alignment(
    files: &[std::path::PathBuf],
    params: &AlignmentParams,
    translations: &mut [(f32, f32)],
    intersection_start: (i32, i32),
    intr_width: i32,
    intr_height: i32,
    ctx: &JobContext,
) -> Result<()> {
    if intr_width < STBL_AREA_SIZE as i32 || intr_height < STBL_AREA_SIZE as i32 {
        return Err(Error::EmptySelection);
    }

    let half = (STBL_AREA_SIZE / 2) as i32;

    // Pick the highest-contrast area of the first frame's intersection.
    let first = blurred_copy(
        &io::load_image_as_mono32f(&files[0], params.normalize_fits_values)?,
        1.0,
    )?;

    let mut stabilization_pos = (half, half);
    let mut max_quality = 0.0f32;
    for i in 0..(intr_width / half - 1).max(0) {
        for j in 0..(intr_height / half - 1).max(0) {
            let area = Rect::new(
                intersection_start.0 + i * half,
                intersection_start.1 + j * half,
                STBL_AREA_SIZE,
                STBL_AREA_SIZE,
            );
            if !area.fits_in(first.width(), first.height()) {
                continue;
            }
            let quality = get_quality(&first, area);
            if quality > max_quality {
                max_quality = quality;
                stabilization_pos = (i * half + half, j * half + half);
            }
        }
    }

    let wnd = calc_window_function(STBL_AREA_SIZE, STBL_AREA_SIZE);

    let mut prev_area = windowed_area(
        &first,
        intersection_start.0 + stabilization_pos.0 - half,
        intersection_start.1 + stabilization_pos.1 - half,
        &wnd,
    )?;
    drop(first);

    // Feature positions in each frame, relative to the intersection origin.
    let mut track: Vec<(f32, f32)> =
        vec![(stabilization_pos.0 as f32, stabilization_pos.1 as f32)];
    let mut prev_frac = (0.0f32, 0.0f32);

    ctx.send(AlignmentEvent::LimbStabilizationProgress { index: 0 });

    for (i, path) in files.iter().enumerate().skip(1) {
        ctx.check_abort()?;
        ctx.send(AlignmentEvent::LimbStabilizationProgress { index: i });

        let curr = io::load_image_as_mono32f(path, params.normalize_fits_values)?;

        let t_int = (
            translations[i].0.trunc() as i32,
            translations[i].1.trunc() as i32,
        );
        let t_frac = (translations[i].0.fract(), translations[i].1.fract());

        let area_origin = |pos: (i32, i32)| {
            (
                intersection_start.0 - t_int.0 + pos.0 - half,
                intersection_start.1 - t_int.1 + pos.1 - half,
            )
        };

        let origin = area_origin(stabilization_pos);
        let curr_area = windowed_area(&curr, origin.0, origin.1, &wnd)?;

        let mut delta = determine_translation_vector(&prev_area, &curr_area)?;
        // The sub-areas start at integer coordinates; fold the fractional
        // parts of the frame translations back in.
        delta.0 += t_frac.0 - prev_frac.0;
        delta.1 += t_frac.1 - prev_frac.1;

        let prev_track = *track.last().unwrap();
        track.push((prev_track.0 + delta.0, prev_track.1 + delta.1));

        // Follow the feature with the tracking area, as long as it stays
        // inside the intersection.
        let candidate = (
            stabilization_pos.0 + delta.0 as i32,
            stabilization_pos.1 + delta.1 as i32,
        );
        if candidate.0 - half >= 0
            && candidate.1 - half >= 0
            && candidate.0 + half < intr_width
            && candidate.1 + half < intr_height
        {
            stabilization_pos = candidate;
        }

        let origin = area_origin(stabilization_pos);
        prev_area = windowed_area(&curr, origin.0, origin.1, &wnd)?;
        prev_frac = t_frac;
    }

    // Project the track onto a fitted circular arc.
    let arc = fit_circle(&track, None, None)?;
    info!(
        "stabilization arc: center ({:.1}, {:.1}), r = {:.1}",
        arc.cx, arc.cy, arc.r
    );

    // Long-term direction of motion along the arc, from the cross product
    // of the vectors to the first and last point.
    let v_first = (track[0].0 - arc.cx, track[0].1 - arc.cy);
    let v_last = (
        track[track.len() - 1].0 - arc.cx,
        track[track.len() - 1].1 - arc.cy,
    );
    let first_last_cross = v_first.0 * v_last.1 - v_first.1 * v_last.0;

    let mut prev_proj = (0.0f32, 0.0f32);
    for (i, p) in track.iter().enumerate() {
        let mut correction = (0.0f32, 0.0f32);
        let len = ((p.0 - arc.cx).powi(2) + (p.1 - arc.cy).powi(2)).sqrt();
        if len > 1.0e-8 {
            let mut proj = (
                arc.r * (p.0 - arc.cx) / len + arc.cx,
                arc.r * (p.1 - arc.cy) / len + arc.cy,
            );

            if i >= 1 {
                // A projected point may not move backwards along the arc:
                // its cross product with the previous projection must agree
                // in sign with the overall direction.
                let cross = (prev_proj.0 - arc.cx) * (p.1 - arc.cy)
                    - (prev_proj.1 - arc.cy) * (p.0 - arc.cx);
                if cross * first_last_cross < 0.0 {
                    proj = prev_proj;
                }
            }

            correction = (proj.0 - p.0, proj.1 - p.1);
            prev_proj = proj;
        }

        translations[i].0 += correction.0;
        translations[i].1 += correction.1;
    }

    Ok(())
}

/// The complete limb-alignment job. Inputs must be files.
pub(crate) fn align_limb(params: &AlignmentParams, ctx: &JobContext) -> Result<()> {
    let AlignmentInput::Files(files) = &params.input else {
        return Err(Error::UnsupportedFormat(
            "limb alignment requires file input".into(),
        ));
    };
    if files.is_empty() {
        return Err(Error::EmptySelection);
    }

    // 1. Find limb points and disc radius in every image.
    let detection = find_radii(files, params, ctx)?;

    // 2. Radii should agree; a large spread means misdetected limbs
    // (vignetting, strong limb darkening).
    let min_r = detection.radii.iter().cloned().fold(f32::MAX, f32::min);
    let max_r = detection.radii.iter().cloned().fold(f32::MIN, f32::max);
    if max_r / min_r > MAX_RADII_SPREAD {
        return Err(Error::DiscRadiusSpread);
    }
    let avg_radius = detection.radii.iter().sum::<f32>() / detection.radii.len() as f32;
    ctx.send(AlignmentEvent::LimbUsingRadius { radius: avg_radius });

    // 3. Refit disc centers with the radius fixed to the average.
    let mut translations: Vec<(f32, f32)> = Vec::with_capacity(files.len());
    let mut first_center = (0.0f32, 0.0f32);
    for (i, points) in detection.limb_points.iter().enumerate() {
        ctx.check_abort()?;
        let circle = fit_circle(points, Some(avg_radius), Some(detection.centroids[i]))
            .map_err(|_| Error::LimbNotFound(files[i].clone()))?;
        if i == 0 {
            first_center = (circle.cx, circle.cy);
        }
        translations.push((first_center.0 - circle.cx, first_center.1 - circle.cy));
    }

    // 4. Bounding box and intersection relative to the first image's origin.
    // Translation is applied truncated towards zero, matching the output
    // translation step.
    let mut bbox = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    let mut intersection = (i32::MIN, i32::MIN, i32::MAX, i32::MAX);
    for (i, t) in translations.iter().enumerate() {
        let tx = t.0 as i32;
        let ty = t.1 as i32;
        let (w, h) = (detection.sizes[i].0 as i32, detection.sizes[i].1 as i32);
        bbox = (
            bbox.0.min(tx),
            bbox.1.min(ty),
            bbox.2.max(tx + w),
            bbox.3.max(ty + h),
        );
        intersection = (
            intersection.0.max(tx),
            intersection.1.max(ty),
            intersection.2.min(tx + w),
            intersection.3.min(ty + h),
        );
    }

    // 5. Stabilization; its failure is reported but not fatal.
    if let Err(e) = stabilize_limb_alignment(
        files,
        params,
        &mut translations,
        (intersection.0, intersection.1),
        intersection.2 - intersection.0,
        intersection.3 - intersection.1,
        ctx,
    ) {
        if matches!(e, Error::Cancelled) {
            return Err(e);
        }
        ctx.send(AlignmentEvent::LimbStabilizationFailure {
            message: e.to_string(),
        });
    }

    // 6. Load, translate and save every frame.
    let (out_w, out_h) = match params.crop_mode {
        CropMode::PadToBoundingBox => (bbox.2 - bbox.0, bbox.3 - bbox.1),
        CropMode::CropToIntersection => {
            (intersection.2 - intersection.0, intersection.3 - intersection.1)
        }
    };

    for (i, path) in files.iter().enumerate() {
        ctx.check_abort()?;

        let (mut tx, mut ty) = match params.crop_mode {
            CropMode::PadToBoundingBox => (
                translations[i].0 - bbox.0 as f32,
                translations[i].1 - bbox.1 as f32,
            ),
            CropMode::CropToIntersection => (
                translations[i].0 - intersection.0 as f32,
                translations[i].1 - intersection.1 as f32,
            ),
        };
        if !params.subpixel_alignment {
            tx = tx.round();
            ty = ty.round();
        }

        save_translated_output_image(params, path, (out_w as u32, out_h as u32), tx, ty)?;
        ctx.send(AlignmentEvent::SavedOutputImage { index: i });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn disc_image(w: u32, h: u32, cx: f32, cy: f32, r: f32) -> Image {
        let mut img = Image::new(w, h, PixelFormat::Mono8).unwrap();
        for y in 0..h {
            for x in 0..w as usize {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                // A touch of edge softness keeps the limb realistic.
                let d = (dx * dx + dy * dy).sqrt();
                let v = if d < r - 1.0 {
                    200
                } else if d < r + 1.0 {
                    (200.0 * (r + 1.0 - d) / 2.0) as u8 + 12
                } else {
                    12
                };
                img.row_mut::<u8>(y)[x] = v;
            }
        }
        img
    }

    #[test]
    fn threshold_separates_disc_from_background() {
        let img = disc_image(200, 200, 100.0, 100.0, 60.0);
        let (threshold, avg_disc, avg_bkgrnd) = find_disc_background_threshold(&img);
        assert!(threshold > 12 && threshold < 200);
        assert!(avg_disc >= 190);
        assert!(avg_bkgrnd <= 30);
    }

    #[test]
    fn centroid_of_offset_disc() {
        let img = disc_image(200, 200, 70.0, 120.0, 40.0);
        let (cx, cy) = calc_centroid(&img);
        // The faint background pulls the centroid towards the image center.
        assert!((cx - 70.0).abs() < 12.0);
        assert!((cy - 120.0).abs() < 12.0);
    }

    #[test]
    fn limb_points_fit_disc_circle() {
        let img = disc_image(300, 300, 160.0, 140.0, 90.0);
        let (threshold, _, _) = find_disc_background_threshold(&img);
        let centroid = calc_centroid(&img);

        let mut points = Vec::new();
        for j in 0..NUM_RAYS {
            let angle = j as f32 * 2.0 * std::f32::consts::PI / NUM_RAYS as f32;
            let ray = ray_points(centroid, (angle.cos(), angle.sin()), &img);
            if let Some((p, _)) = find_limb_crossing(&ray, threshold) {
                points.push(p);
            }
        }
        assert!(points.len() > NUM_RAYS / 2);

        let circle = fit_circle(&points, None, Some(centroid)).unwrap();
        assert!((circle.cx - 160.0).abs() < 2.0);
        assert!((circle.cy - 140.0).abs() < 2.0);
        assert!((circle.r - 90.0).abs() < 3.0);
    }

    #[test]
    fn neighbor_count_on_disc_edge() {
        let img = disc_image(200, 200, 100.0, 100.0, 60.0);
        let (threshold, _, _) = find_disc_background_threshold(&img);
        // A point on the limb sees roughly half disc, half background.
        let (above, total) =
            count_neighbors_above_threshold((160.0, 100.0), &img, DIFF_SIZE as i32, threshold);
        let fraction = above as f32 / total as f32;
        assert!(fraction > 0.3 && fraction < MAX_ABOVE_THRESHOLD_FRACTION);
        // A point deep inside the disc sees only disc.
        let (above, total) =
            count_neighbors_above_threshold((100.0, 100.0), &img, DIFF_SIZE as i32, threshold);
        assert_eq!(above, total);
    }
}
