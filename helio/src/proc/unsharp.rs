// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Standard and adaptive (brightness-steered) unsharp masking.

use crate::math::gaussian::{ConvolutionMethod, convolve_separable};
use crate::util::for_each_row_mut;

/// Sigma of the Gaussian applied to the raw image when deriving the local
/// steering brightness for the adaptive mode.
const RAW_IMAGE_BLUR_SIGMA: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnsharpMaskParams {
    pub adaptive: bool,
    pub sigma: f32,
    /// Amount at low brightness (adaptive mode only).
    pub amount_min: f32,
    /// Amount at high brightness, or simply "amount" in non-adaptive mode.
    pub amount_max: f32,
    /// Brightness at the center of the min-to-max transition.
    pub threshold: f32,
    /// Half-width of the transition.
    pub width: f32,
}

impl Default for UnsharpMaskParams {
    fn default() -> Self {
        UnsharpMaskParams {
            adaptive: false,
            sigma: 1.3,
            amount_min: 1.0,
            amount_max: 1.0,
            threshold: 0.01,
            width: 0.01,
        }
    }
}

impl UnsharpMaskParams {
    /// `false` when the pass leaves the image unchanged.
    pub fn is_effective(&self) -> bool {
        if self.adaptive {
            self.amount_min != 1.0 || self.amount_max != 1.0
        } else {
            self.amount_max != 1.0
        }
    }
}

/// Applies one unsharp-masking pass. `raw_input` is the unprocessed
/// selection, used only by the adaptive mode to steer the amount. The
/// output is clamped to `[0, 1]`.
pub fn unsharp_mask(
    input: &[f32],
    raw_input: &[f32],
    width: usize,
    height: usize,
    output: &mut [f32],
    params: &UnsharpMaskParams,
) {
    assert_eq!(input.len(), width * height);
    assert_eq!(raw_input.len(), width * height);
    assert_eq!(output.len(), width * height);

    let mut gaussian = vec![0.0f32; width * height];
    convolve_separable(
        input,
        width,
        height,
        &mut gaussian,
        params.sigma,
        ConvolutionMethod::Auto,
    );

    if !params.adaptive {
        // Constant amount over the whole image.
        let a = params.amount_max;
        for_each_row_mut(output, width, |y, out_row| {
            let off = y * width;
            for (x, out) in out_row.iter_mut().enumerate() {
                let v = a * input[off + x] + (1.0 - a) * gaussian[off + x];
                *out = v.clamp(0.0, 1.0);
            }
        });
        return;
    }

    // The amount depends on the local brightness of the raw image, smoothed
    // to alleviate noise. Between the constant branches the amount follows
    // the cubic whose value and first derivative match them at
    // threshold -/+ width and whose inflection lies at the threshold.
    let mut steering = vec![0.0f32; width * height];
    convolve_separable(
        raw_input,
        width,
        height,
        &mut steering,
        RAW_IMAGE_BLUR_SIGMA,
        ConvolutionMethod::Auto,
    );

    let amin = params.amount_min;
    let amax = params.amount_max;
    let t = params.threshold;
    let w = params.width;

    let divisor = 4.0 * w * w * w;
    let a = (amin - amax) / divisor;
    let b = 3.0 * (amax - amin) * t / divisor;
    let c = 3.0 * (amax - amin) * (w - t) * (w + t) / divisor;
    let d = (2.0 * w * w * w * (amin + amax) + 3.0 * t * w * w * (amin - amax)
        + t * t * t * (amax - amin))
        / divisor;

    for_each_row_mut(output, width, |y, out_row| {
        let off = y * width;
        for (x, out) in out_row.iter_mut().enumerate() {
            let l = steering[off + x];
            let amount = if l < t - w {
                amin
            } else if l > t + w {
                amax
            } else {
                l * (l * (a * l + b) + c) + d
            };
            let v = amount * input[off + x] + (1.0 - amount) * gaussian[off + x];
            *out = v.clamp(0.0, 1.0);
        }
    });
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    fn random_input(n: usize, seed: u64) -> Vec<f32> {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        (0..n).map(|_| rng.random::<f32>()).collect()
    }

    #[test]
    fn neutral_amount_is_identity() {
        let input = random_input(32 * 32, 1);
        let mut output = vec![0.0f32; 32 * 32];
        let params = UnsharpMaskParams {
            amount_max: 1.0,
            ..Default::default()
        };
        assert!(!params.is_effective());
        unsharp_mask(&input, &input, 32, 32, &mut output, &params);
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn neutral_adaptive_is_identity() {
        let params = UnsharpMaskParams {
            adaptive: true,
            amount_min: 1.0,
            amount_max: 1.0,
            threshold: 0.5,
            width: 0.2,
            ..Default::default()
        };
        assert!(!params.is_effective());
        let input = random_input(16 * 16, 2);
        let mut output = vec![0.0f32; 16 * 16];
        unsharp_mask(&input, &input, 16, 16, &mut output, &params);
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn output_stays_in_unit_range() {
        let input = random_input(64 * 64, 3);
        let mut output = vec![0.0f32; 64 * 64];
        let params = UnsharpMaskParams {
            sigma: 1.3,
            amount_max: 5.0,
            ..Default::default()
        };
        unsharp_mask(&input, &input, 64, 64, &mut output, &params);
        for &v in &output {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn amplifies_contrast_at_an_edge() {
        let (w, h) = (32usize, 8usize);
        let mut input = vec![0.3f32; w * h];
        for y in 0..h {
            for x in w / 2..w {
                input[y * w + x] = 0.7;
            }
        }
        let mut output = vec![0.0f32; w * h];
        let params = UnsharpMaskParams {
            sigma: 2.0,
            amount_max: 2.0,
            ..Default::default()
        };
        unsharp_mask(&input, &input, w, h, &mut output, &params);
        let row = h / 2 * w;
        // Overshoot on both sides of the edge.
        assert!(output[row + w / 2 - 2] < 0.3);
        assert!(output[row + w / 2 + 1] > 0.7);
    }

    #[test]
    fn adaptive_amount_transitions_between_branches() {
        // Dark half and bright half with a gentle gradient; amounts should
        // approach amount_min in the dark region and amount_max in the
        // bright region.
        let (w, h) = (64usize, 32usize);
        let mut input = vec![0.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                input[y * w + x] = if x < w / 2 { 0.1 } else { 0.9 };
            }
        }
        let params = UnsharpMaskParams {
            adaptive: true,
            sigma: 1.5,
            amount_min: 1.0,
            amount_max: 3.0,
            threshold: 0.5,
            width: 0.1,
        };
        let mut output = vec![0.0f32; w * h];
        unsharp_mask(&input, &input, w, h, &mut output, &params);

        // amount_min = 1 leaves the dark side untouched away from the edge.
        let row = h / 2 * w;
        assert!((output[row + 4] - 0.1).abs() < 1e-3);
        // The bright side is sharpened: interior stays 0.9, but values near
        // the transition overshoot.
        assert!((output[row + w - 4] - 0.9).abs() < 1e-3);
        assert!(output[row + w / 2 + 1] > 0.9);
    }
}
