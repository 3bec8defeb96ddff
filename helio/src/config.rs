// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Configuration knobs the core consumes. The host owns persistence and
//! passes a populated [`CoreConfig`] in at construction; the core never
//! reaches for global state.

use crate::math::gaussian::ConvolutionMethod;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoreConfig {
    /// Throttle for interactive parameter-change events, in requests per
    /// second; 0 means no limit. Enforced by the host, carried here so all
    /// front ends share one default.
    pub max_processing_requests_per_sec: u32,
    /// Number of entries of the tone curve look-up table.
    pub tone_curve_lut_size: usize,
    /// Rescale FITS floating-point data into [0, 1] when its maximum
    /// exceeds 1.
    pub normalize_fits_values: bool,
    /// Gaussian convolution implementation selection.
    pub convolution_method: ConvolutionMethod,
}

impl Default for CoreConfig {
    fn default() -> CoreConfig {
        CoreConfig {
            max_processing_requests_per_sec: 30,
            tone_curve_lut_size: crate::proc::tcurve::DEFAULT_LUT_SIZE,
            normalize_fits_values: true,
            convolution_method: ConvolutionMethod::Auto,
        }
    }
}
