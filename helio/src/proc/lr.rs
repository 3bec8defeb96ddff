// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Lucy-Richardson deconvolution with a Gaussian point-spread function.

use tracing::debug;

use crate::math::gaussian::{ConvolutionMethod, convolve_separable};
use crate::worker::CompletionStatus;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeringingSettings {
    pub enabled: bool,
    /// Brightness above/below which pixels get their neighborhood blurred.
    pub threshold: f32,
    pub greater_than: bool,
    pub sigma: f32,
}

impl Default for DeringingSettings {
    fn default() -> Self {
        DeringingSettings {
            enabled: false,
            threshold: 254.0 / 255.0,
            greater_than: true,
            sigma: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LucyRichardsonSettings {
    pub sigma: f32,
    pub iterations: u32,
    pub deringing: DeringingSettings,
}

impl Default for LucyRichardsonSettings {
    fn default() -> Self {
        LucyRichardsonSettings {
            sigma: 1.3,
            iterations: 50,
            deringing: DeringingSettings::default(),
        }
    }
}

impl LucyRichardsonSettings {
    pub fn is_effective(&self) -> bool {
        self.iterations > 0
    }
}

/// Guard against division by a vanishing re-convolved estimate.
const DIV_EPSILON: f32 = 1.0e-8;

/// Reproduces the original image from `input` convolved with a Gaussian and
/// writes the estimate to `output`. `progress` receives (iteration, total)
/// after every iteration; `check_abort` is polled between iterations.
/// The output is left unclamped; callers clamp to `[0, 1]`.
pub fn lucy_richardson_gaussian(
    input: &[f32],
    width: usize,
    height: usize,
    output: &mut [f32],
    num_iters: u32,
    sigma: f32,
    conv_method: ConvolutionMethod,
    progress: &mut dyn FnMut(u32, u32),
    check_abort: &mut dyn FnMut() -> bool,
) -> CompletionStatus {
    assert_eq!(input.len(), width * height);
    assert_eq!(output.len(), width * height);

    output.copy_from_slice(input);
    if num_iters == 0 {
        return CompletionStatus::Completed;
    }

    let n = width * height;
    let mut conv = vec![0.0f32; n];
    let mut ratio = vec![0.0f32; n];
    let mut conv2 = vec![0.0f32; n];

    for iter in 0..num_iters {
        convolve_separable(output, width, height, &mut conv, sigma, conv_method);
        for i in 0..n {
            ratio[i] = input[i] / conv[i].max(DIV_EPSILON);
        }
        convolve_separable(&ratio, width, height, &mut conv2, sigma, conv_method);
        for i in 0..n {
            output[i] *= conv2[i];
        }

        progress(iter + 1, num_iters);
        if check_abort() {
            debug!("L-R deconvolution aborted at iteration {}", iter + 1);
            return CompletionStatus::Aborted;
        }
    }

    CompletionStatus::Completed
}

/// Blurs the neighborhoods of pixels lying on the `greater_than` side of
/// `threshold`; used before deconvolution to soften overexposed cores that
/// would otherwise produce ringing halos. Pixels outside the affected
/// neighborhoods keep their exact input values.
pub fn blur_threshold_vicinity(
    input: &[f32],
    width: usize,
    height: usize,
    output: &mut [f32],
    threshold: f32,
    greater_than: bool,
    sigma: f32,
) {
    assert_eq!(input.len(), width * height);
    assert_eq!(output.len(), width * height);

    let radius = (3.0 * sigma).ceil() as usize;

    // Threshold mask, dilated by the blur radius.
    let mut mask = vec![0.0f32; width * height];
    for (m, &v) in mask.iter_mut().zip(input) {
        if (greater_than && v > threshold) || (!greater_than && v < threshold) {
            *m = 1.0;
        }
    }
    let dilated = dilate(&mask, width, height, radius);

    // Feathered blend weight: the mask blurred with the same sigma, but
    // forced to zero outside the dilated area so untouched pixels stay
    // bit-identical to the input.
    let mut weight = vec![0.0f32; width * height];
    convolve_separable(
        &mask,
        width,
        height,
        &mut weight,
        sigma,
        ConvolutionMethod::Standard,
    );

    let mut blurred = vec![0.0f32; width * height];
    convolve_separable(
        input,
        width,
        height,
        &mut blurred,
        sigma,
        ConvolutionMethod::Standard,
    );

    for i in 0..width * height {
        if dilated[i] == 0.0 {
            output[i] = input[i];
        } else {
            let w = weight[i].clamp(0.0, 1.0);
            output[i] = w * blurred[i] + (1.0 - w) * input[i];
        }
    }
}

/// Binary dilation by a `radius`-sized box, via separable max passes.
fn dilate(mask: &[f32], width: usize, height: usize, radius: usize) -> Vec<f32> {
    let mut tmp = vec![0.0f32; width * height];
    for y in 0..height {
        let row = &mask[y * width..(y + 1) * width];
        let out = &mut tmp[y * width..(y + 1) * width];
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            out[x] = if row[lo..=hi].iter().any(|&v| v > 0.0) {
                1.0
            } else {
                0.0
            };
        }
    }
    let mut out = vec![0.0f32; width * height];
    for y in 0..height {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(height - 1);
        for x in 0..width {
            let mut any = false;
            for yy in lo..=hi {
                if tmp[yy * width + x] > 0.0 {
                    any = true;
                    break;
                }
            }
            out[y * width + x] = if any { 1.0 } else { 0.0 };
        }
    }
    out
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn zero_iterations_return_input_unchanged() {
        let input: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();
        let mut output = vec![0.0f32; 64];
        let status = lucy_richardson_gaussian(
            &input,
            8,
            8,
            &mut output,
            0,
            3.0,
            ConvolutionMethod::Auto,
            &mut |_, _| {},
            &mut || false,
        );
        assert_eq!(status, CompletionStatus::Completed);
        assert_eq!(input, output);
    }

    #[test]
    fn uniform_field_is_a_fixed_point() {
        let input = vec![0.5f32; 32 * 32];
        let mut output = vec![0.0f32; 32 * 32];
        lucy_richardson_gaussian(
            &input,
            32,
            32,
            &mut output,
            10,
            1.3,
            ConvolutionMethod::Standard,
            &mut |_, _| {},
            &mut || false,
        );
        for &v in &output {
            assert!((v - 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn sharpens_a_blurred_edge() {
        // A blurred step should steepen after deconvolution.
        let (w, h) = (64usize, 16usize);
        let mut step = vec![0.0f32; w * h];
        for y in 0..h {
            for x in w / 2..w {
                step[y * w + x] = 1.0;
            }
        }
        let mut blurred = vec![0.0f32; w * h];
        convolve_separable(&step, w, h, &mut blurred, 2.0, ConvolutionMethod::Standard);

        let mut restored = vec![0.0f32; w * h];
        lucy_richardson_gaussian(
            &blurred,
            w,
            h,
            &mut restored,
            30,
            2.0,
            ConvolutionMethod::Standard,
            &mut |_, _| {},
            &mut || false,
        );

        let mid = h / 2 * w;
        let blurred_slope = blurred[mid + w / 2] - blurred[mid + w / 2 - 1];
        let restored_slope = restored[mid + w / 2] - restored[mid + w / 2 - 1];
        assert!(restored_slope > blurred_slope * 1.5);
    }

    #[test]
    fn abort_is_honored_between_iterations() {
        let input = vec![0.5f32; 16 * 16];
        let mut output = vec![0.0f32; 16 * 16];
        let mut iters_seen = 0;
        let status = lucy_richardson_gaussian(
            &input,
            16,
            16,
            &mut output,
            100,
            1.3,
            ConvolutionMethod::Standard,
            &mut |i, _| iters_seen = i,
            &mut || true,
        );
        assert_eq!(status, CompletionStatus::Aborted);
        assert_eq!(iters_seen, 1);
    }

    #[test]
    fn deringing_leaves_far_pixels_bit_identical() {
        let (w, h) = (48usize, 48usize);
        let mut input: Vec<f32> = (0..w * h).map(|i| (i % 97) as f32 / 200.0).collect();
        // A hot core in the middle.
        for y in 20..28 {
            for x in 20..28 {
                input[y * w + x] = 1.0;
            }
        }
        let mut output = vec![0.0f32; w * h];
        blur_threshold_vicinity(&input, w, h, &mut output, 254.0 / 255.0, true, 1.0);

        // Far corner is untouched, the core's edge is softened.
        assert_eq!(output[0], input[0]);
        assert_eq!(output[w * h - 1], input[w * h - 1]);
        let core_edge = 24 * w + 20;
        assert!(output[core_edge] < input[core_edge]);
    }
}
