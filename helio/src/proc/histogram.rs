// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::image::{Image, PixelFormat, Rect};

pub const NUM_HISTOGRAM_BINS: usize = 1024;

#[derive(Clone, Debug)]
pub struct Histogram {
    pub values: Vec<u32>,
    pub min_value: f32,
    pub max_value: f32,
    pub max_count: u32,
}

/// Bins the brightness of a `Mono32F` rectangle. Out-of-range samples land
/// in the first/last bin.
pub fn determine_histogram(img: &Image, selection: Rect) -> Histogram {
    assert_eq!(img.format(), PixelFormat::Mono32F);
    assert!(selection.fits_in(img.width(), img.height()));

    let mut values = vec![0u32; NUM_HISTOGRAM_BINS];
    let mut min_value = f32::MAX;
    let mut max_value = f32::MIN;

    for y in 0..selection.height {
        let row = img.row::<f32>(selection.y as u32 + y);
        for &v in &row[selection.x as usize..selection.x as usize + selection.width as usize] {
            min_value = min_value.min(v);
            max_value = max_value.max(v);
            let bin = (v * (NUM_HISTOGRAM_BINS - 1) as f32) as i64;
            values[bin.clamp(0, NUM_HISTOGRAM_BINS as i64 - 1) as usize] += 1;
        }
    }

    let max_count = values.iter().copied().max().unwrap_or(0);
    Histogram {
        values,
        min_value,
        max_value,
        max_count,
    }
}
