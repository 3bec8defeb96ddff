// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Radix-2 decimation-in-time FFT; 2-D transforms use the row-column
//! algorithm. Dimensions must be powers of two (the alignment engine pads
//! its working buffers accordingly).

use num_complex::Complex32;

use crate::error::{Error, Result};
use crate::util::{for_each_row_mut, is_pow2, transpose};

/// In-place 1-D FFT of a power-of-two-length buffer.
/// `inverse` conjugates the twiddle factors but does not scale.
fn fft_1d(data: &mut [Complex32], inverse: bool) {
    let n = data.len();
    debug_assert!(is_pow2(n));
    if n < 2 {
        return;
    }

    // Bit-reversal permutation.
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            data.swap(i, j);
        }
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut len = 2;
    while len <= n {
        let angle = sign * 2.0 * std::f32::consts::PI / len as f32;
        let wlen = Complex32::from_polar(1.0, angle);
        for start in (0..n).step_by(len) {
            let mut w = Complex32::new(1.0, 0.0);
            for k in 0..len / 2 {
                let t = data[start + k];
                let h = w * data[start + k + len / 2];
                data[start + k] = t + h;
                data[start + k + len / 2] = t - h;
                w *= wlen;
            }
        }
        len <<= 1;
    }
}

fn check_dims(rows: usize, cols: usize) -> Result<()> {
    if !is_pow2(rows) {
        return Err(Error::NotPowerOfTwo(rows));
    }
    if !is_pow2(cols) {
        return Err(Error::NotPowerOfTwo(cols));
    }
    Ok(())
}

/// 2-D forward FFT of a real input (`rows` x `cols`, row-major).
pub fn fft_2d(input: &[f32], rows: usize, cols: usize, output: &mut [Complex32]) -> Result<()> {
    check_dims(rows, cols)?;
    assert_eq!(input.len(), rows * cols);
    assert_eq!(output.len(), rows * cols);

    for (o, &i) in output.iter_mut().zip(input) {
        *o = Complex32::new(i, 0.0);
    }
    for_each_row_mut(output, cols, |_, row| fft_1d(row, false));

    let mut tr = vec![Complex32::default(); rows * cols];
    transpose(output, cols, rows, &mut tr);
    for_each_row_mut(&mut tr, rows, |_, col| fft_1d(col, false));
    transpose(&tr, rows, cols, output);
    Ok(())
}

/// 2-D inverse FFT; scales by `1 / (rows * cols)`.
pub fn fft_inv_2d(
    input: &[Complex32],
    rows: usize,
    cols: usize,
    output: &mut [Complex32],
) -> Result<()> {
    check_dims(rows, cols)?;
    assert_eq!(input.len(), rows * cols);
    assert_eq!(output.len(), rows * cols);

    output.copy_from_slice(input);
    let cols_inv = 1.0 / cols as f32;
    for_each_row_mut(output, cols, |_, row| {
        fft_1d(row, true);
        for v in row.iter_mut() {
            *v *= cols_inv;
        }
    });

    let rows_inv = 1.0 / rows as f32;
    let mut tr = vec![Complex32::default(); rows * cols];
    transpose(output, cols, rows, &mut tr);
    for_each_row_mut(&mut tr, rows, |_, col| {
        fft_1d(col, true);
        for v in col.iter_mut() {
            *v *= rows_inv;
        }
    });
    transpose(&tr, rows, cols, output);
    Ok(())
}

/// Cross-power spectrum `conj(F1) * F2 / |conj(F1) * F2|`; elements whose
/// magnitude falls below the guard are left unnormalized.
pub fn cross_power_spectrum(f1: &[Complex32], f2: &[Complex32], output: &mut [Complex32]) {
    assert_eq!(f1.len(), f2.len());
    assert_eq!(f1.len(), output.len());

    const MAGNITUDE_GUARD: f32 = 1.0e-8;

    for ((o, a), b) in output.iter_mut().zip(f1).zip(f2) {
        let v = a.conj() * b;
        let magn = v.norm();
        *o = if magn > MAGNITUDE_GUARD { v / magn } else { v };
    }
}
