// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::image::{Image, PixelFormat};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizationSettings {
    pub enabled: bool,
    pub min: f32,
    pub max: f32,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        NormalizationSettings {
            enabled: false,
            min: 0.0,
            max: 1.0,
        }
    }
}

/// Linearly rescales a `Mono32F` image so its darkest input pixels map to
/// `min_level` and the brightest to `max_level`, then clamps to `[0, 1]`.
/// `max_level` may be lower than `min_level` (brightness inversion).
pub fn normalize_fp_image(img: &mut Image, min_level: f32, max_level: f32) {
    assert_eq!(img.format(), PixelFormat::Mono32F);

    let mut lmin = f32::MAX;
    let mut lmax = f32::MIN;
    for &v in img.pixels::<f32>() {
        lmin = lmin.min(v);
        lmax = lmax.max(v);
    }
    if lmax == lmin {
        return;
    }

    // new_luminance = a * old_luminance + b
    let a = (max_level - min_level) / (lmax - lmin);
    let b = max_level - a * lmax;

    for v in img.pixels_mut::<f32>() {
        *v = (a * *v + b).clamp(0.0, 1.0);
    }
}
