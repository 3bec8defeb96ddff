// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Separable Gaussian convolution: a direct kernel for small sigmas and the
//! Young & van Vliet recursive approximation for large ones.

use crate::util::{for_each_row_mut, transpose};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ConvolutionMethod {
    /// Direct kernel below [`YVV_SIGMA_THRESHOLD`], recursive above.
    #[default]
    Auto,
    /// 1-D kernel projection convolved over rows, then columns.
    Standard,
    /// Young & van Vliet 3rd-order recursive approximation.
    YoungVanVliet,
}

/// `Auto` switches to the recursive filter here; below it the direct kernel
/// is small and exact, above it the IIR wins on speed with error well under
/// the direct path's quantization.
pub const YVV_SIGMA_THRESHOLD: f32 = 2.0;

/// Convolves `src` (`width` x `height`, row-major) with a Gaussian kernel of
/// the given `sigma` and writes the result to `dest`. Edge samples are
/// clamped to the valid range.
pub fn convolve_separable(
    src: &[f32],
    width: usize,
    height: usize,
    dest: &mut [f32],
    sigma: f32,
    method: ConvolutionMethod,
) {
    assert_eq!(src.len(), width * height);
    assert_eq!(dest.len(), width * height);
    assert!(sigma > 0.0);

    let use_yvv = match method {
        ConvolutionMethod::Standard => false,
        ConvolutionMethod::YoungVanVliet => true,
        ConvolutionMethod::Auto => sigma >= YVV_SIGMA_THRESHOLD,
    };

    if use_yvv {
        convolve_yvv(src, width, height, dest, sigma);
    } else {
        convolve_direct(src, width, height, dest, sigma);
    }
}

/// Discrete Gaussian kernel of radius `ceil(3 sigma)`, normalized to sum 1.
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as usize;
    let mut kernel = vec![0.0f32; 2 * radius + 1];
    let inv2s2 = 1.0 / (2.0 * sigma * sigma);
    for (i, k) in kernel.iter_mut().enumerate() {
        let d = i as f32 - radius as f32;
        *k = (-d * d * inv2s2).exp();
    }
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

fn convolve_direct(src: &[f32], width: usize, height: usize, dest: &mut [f32], sigma: f32) {
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;

    // Rows.
    let mut tmp = vec![0.0f32; width * height];
    for_each_row_mut(&mut tmp, width, |y, out_row| {
        let in_row = &src[y * width..(y + 1) * width];
        convolve_line(in_row, out_row, &kernel, radius);
    });

    // Columns, via transpose so the inner loops stay contiguous.
    let mut tr = vec![0.0f32; width * height];
    transpose(&tmp, width, height, &mut tr);
    let mut tr_out = vec![0.0f32; width * height];
    for_each_row_mut(&mut tr_out, height, |x, out_col| {
        let in_col = &tr[x * height..(x + 1) * height];
        convolve_line(in_col, out_col, &kernel, radius);
    });
    transpose(&tr_out, height, width, dest);
}

/// 1-D convolution with index clamping at the edges.
fn convolve_line(input: &[f32], output: &mut [f32], kernel: &[f32], radius: usize) {
    let n = input.len() as isize;
    for (i, out) in output.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (k, w) in kernel.iter().enumerate() {
            let j = (i as isize + k as isize - radius as isize).clamp(0, n - 1);
            acc += input[j as usize] * w;
        }
        *out = acc;
    }
}

/// Young & van Vliet recursive coefficients for the given sigma.
fn yvv_coefficients(sigma: f32) -> ([f32; 3], f32, f32) {
    let q = if sigma >= 2.5 {
        0.98711 * sigma - 0.96330
    } else {
        3.97156 - 4.14554 * (1.0 - 0.26891 * sigma).sqrt()
    };

    let b0 = 1.57825 + 2.44413 * q + 1.4281 * q * q + 0.422205 * q * q * q;
    let b1 = 2.44413 * q + 2.85619 * q * q + 1.26661 * q * q * q;
    let b2 = -(1.4281 * q * q + 1.26661 * q * q * q);
    let b3 = 0.422205 * q * q * q;
    let big_b = 1.0 - (b1 + b2 + b3) / b0;

    ([b1 / b0, b2 / b0, b3 / b0], big_b, b0)
}

/// Forward-then-backward 3rd-order IIR pass over one line, in place.
/// Boundaries are initialized by edge replication; the residual boundary
/// error is accepted (callers clamp to the valid range).
fn yvv_line(line: &mut [f32], b: &[f32; 3], big_b: f32) {
    let n = line.len();
    if n == 0 {
        return;
    }

    let mut w1 = line[0];
    let mut w2 = line[0];
    let mut w3 = line[0];
    for v in line.iter_mut() {
        let w = big_b * *v + b[0] * w1 + b[1] * w2 + b[2] * w3;
        *v = w;
        w3 = w2;
        w2 = w1;
        w1 = w;
    }

    let mut o1 = line[n - 1];
    let mut o2 = line[n - 1];
    let mut o3 = line[n - 1];
    for v in line.iter_mut().rev() {
        let o = big_b * *v + b[0] * o1 + b[1] * o2 + b[2] * o3;
        *v = o;
        o3 = o2;
        o2 = o1;
        o1 = o;
    }
}

fn convolve_yvv(src: &[f32], width: usize, height: usize, dest: &mut [f32], sigma: f32) {
    let (b, big_b, _b0) = yvv_coefficients(sigma);

    let mut tmp = src.to_vec();
    for_each_row_mut(&mut tmp, width, |_, row| yvv_line(row, &b, big_b));

    let mut tr = vec![0.0f32; width * height];
    transpose(&tmp, width, height, &mut tr);
    for_each_row_mut(&mut tr, height, |_, col| yvv_line(col, &b, big_b));
    transpose(&tr, height, width, dest);
}
