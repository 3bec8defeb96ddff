// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Tone curve: an ordered set of control points interpolated piecewise
//! linearly or by a Catmull-Rom spline, or overridden by a gamma function.
//! A look-up table serves the interactive path; file save uses the precise
//! evaluation.

pub const DEFAULT_LUT_SIZE: usize = 1024;

/// Minimum spacing between control point x values; colliding points are
/// nudged apart by this much.
const POINT_SPACING_EPS: f32 = 1.0e-4;

/// Spline value = a*t^3 + b*t^2 + c*t + d for t in [0, 1] within a segment.
#[derive(Clone, Copy, Debug, Default)]
struct SplineParams {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
}

#[derive(Clone, Debug)]
pub struct ToneCurve {
    /// Control points (x = argument, y = value), sorted by x; the first and
    /// last always have x = 0 and x = 1.
    points: Vec<(f32, f32)>,
    /// i-th element corresponds to the interval [points[i], points[i+1]].
    spline: Vec<SplineParams>,
    smooth: bool,
    is_gamma: bool,
    gamma: f32,
    lut: Vec<f32>,
}

impl Default for ToneCurve {
    /// Identity map from (0, 0) to (1, 1).
    fn default() -> ToneCurve {
        let mut c = ToneCurve {
            points: vec![(0.0, 0.0), (1.0, 1.0)],
            spline: Vec::new(),
            smooth: false,
            is_gamma: false,
            gamma: 1.0,
            lut: Vec::new(),
        };
        c.calculate_spline();
        c.refresh_lut(DEFAULT_LUT_SIZE);
        c
    }
}

impl ToneCurve {
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, idx: usize) -> (f32, f32) {
        self.points[idx]
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn smooth(&self) -> bool {
        self.smooth
    }

    pub fn set_smooth(&mut self, smooth: bool) {
        self.smooth = smooth;
        self.calculate_spline();
    }

    pub fn is_gamma_mode(&self) -> bool {
        self.is_gamma
    }

    pub fn set_gamma_mode(&mut self, is_gamma: bool) {
        self.is_gamma = is_gamma;
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        debug_assert!(gamma > 0.0);
        self.gamma = gamma;
    }

    /// Removes all points. At least two points have to be added before the
    /// curve is used again; used when deserializing.
    pub(crate) fn clear_points(&mut self) {
        self.points.clear();
        self.spline.clear();
    }

    /// Inserts a point keeping the collection sorted by x; returns its index.
    /// An x colliding with an existing neighbor is nudged apart. Adding a
    /// point deactivates gamma mode.
    pub fn add_point(&mut self, x: f32, y: f32) -> usize {
        let mut x = x;
        let idx = self.points.partition_point(|p| p.0 < x);
        if idx < self.points.len() && (self.points[idx].0 - x).abs() < POINT_SPACING_EPS {
            x -= POINT_SPACING_EPS;
        }
        if idx > 0 && (x - self.points[idx - 1].0).abs() < POINT_SPACING_EPS {
            x += POINT_SPACING_EPS;
        }
        self.points.insert(idx, (x, y));
        self.is_gamma = false;
        self.calculate_spline();
        idx
    }

    /// Removes the point at `idx` unless only two would remain.
    pub fn remove_point(&mut self, idx: usize) {
        if self.points.len() <= 2 {
            return;
        }
        self.points.remove(idx);
        self.calculate_spline();
    }

    pub fn update_point(&mut self, idx: usize, x: f32, y: f32) {
        let mut x = x;
        if idx + 1 < self.points.len() {
            x = x.min(self.points[idx + 1].0 - POINT_SPACING_EPS);
        }
        if idx > 0 {
            x = x.max(self.points[idx - 1].0 + POINT_SPACING_EPS);
        }
        self.points[idx] = (x, y);
        self.calculate_spline();
    }

    /// Index of the point closest to `(x, y)`.
    pub fn closest_point_idx(&self, x: f32, y: f32) -> usize {
        let mut best = 0;
        let mut best_dist = f32::MAX;
        for (i, p) in self.points.iter().enumerate() {
            let d = (p.0 - x) * (p.0 - x) + (p.1 - y) * (p.1 - y);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Resets to the identity map.
    pub fn reset(&mut self) {
        self.points = vec![(0.0, 0.0), (1.0, 1.0)];
        self.smooth = false;
        self.is_gamma = false;
        self.gamma = 1.0;
        self.calculate_spline();
    }

    /// Reflects every point's value to `1 - y` (negative image).
    pub fn invert(&mut self) {
        for p in &mut self.points {
            p.1 = 1.0 - p.1;
        }
        self.calculate_spline();
    }

    /// Remaps point arguments so `[min, max]` covers the former `[0, 1]`
    /// span; used to stretch the curve over a histogram's occupied range.
    pub fn stretch(&mut self, min: f32, max: f32) {
        for p in &mut self.points {
            p.0 = (min + p.0 * (max - min)).clamp(0.0, 1.0);
        }
        self.calculate_spline();
    }

    /// Precomputes Catmull-Rom coefficients per segment, with reflected
    /// endpoint neighbors.
    pub fn calculate_spline(&mut self) {
        self.spline.clear();
        if self.points.len() < 2 {
            return;
        }
        let n = self.points.len();
        let y = |i: isize| -> f32 {
            if i < 0 {
                2.0 * self.points[0].1 - self.points[1].1
            } else if i as usize >= n {
                2.0 * self.points[n - 1].1 - self.points[n - 2].1
            } else {
                self.points[i as usize].1
            }
        };

        for i in 0..n - 1 {
            let p0 = y(i as isize - 1);
            let p1 = y(i as isize);
            let p2 = y(i as isize + 1);
            let p3 = y(i as isize + 2);
            self.spline.push(SplineParams {
                a: -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3,
                b: p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3,
                c: 0.5 * (p2 - p0),
                d: p1,
            });
        }
    }

    /// Tabulates the curve over `lut_size` uniform samples of `[0, 1]`.
    pub fn refresh_lut(&mut self, lut_size: usize) {
        debug_assert!(lut_size >= 2);
        self.lut.clear();
        self.lut.reserve(lut_size);
        for i in 0..lut_size {
            let x = i as f32 / (lut_size - 1) as f32;
            self.lut.push(self.precise_value(x));
        }
    }

    /// LUT lookup. [`ToneCurve::refresh_lut`] must have been called after the
    /// last curve modification.
    #[inline]
    pub fn approximated_value(&self, input: f32) -> f32 {
        debug_assert!(!self.lut.is_empty());
        let idx = (input * (self.lut.len() - 1) as f32) as i64;
        self.lut[idx.clamp(0, self.lut.len() as i64 - 1) as usize]
    }

    /// Direct curve evaluation; not bound by the LUT resolution.
    pub fn precise_value(&self, input: f32) -> f32 {
        let x = input.clamp(0.0, 1.0);

        if self.is_gamma {
            return x.powf(1.0 / self.gamma);
        }

        // Containing segment; the last segment covers x = 1.
        let seg = self
            .points
            .partition_point(|p| p.0 <= x)
            .clamp(1, self.points.len() - 1)
            - 1;
        let (x0, y0) = self.points[seg];
        let (x1, y1) = self.points[seg + 1];
        let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };

        let v = if self.smooth {
            let s = &self.spline[seg];
            t * (t * (s.a * t + s.b) + s.c) + s.d
        } else {
            y0 + t * (y1 - y0)
        };
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn identity_curve_is_identity() {
        let mut c = ToneCurve::default();
        c.refresh_lut(DEFAULT_LUT_SIZE);
        for i in 0..=100 {
            let x = i as f32 / 100.0;
            assert_eq!(c.precise_value(x), x);
            assert!((c.approximated_value(x) - x).abs() < 1.0 / DEFAULT_LUT_SIZE as f32);
        }
    }

    #[test]
    fn gamma_mode_overrides_points() {
        let mut c = ToneCurve::default();
        c.set_gamma_mode(true);
        c.set_gamma(2.0);
        assert!((c.precise_value(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(c.precise_value(0.0), 0.0);
        assert_eq!(c.precise_value(1.0), 1.0);
    }

    #[test]
    fn adding_a_point_disables_gamma() {
        let mut c = ToneCurve::default();
        c.set_gamma_mode(true);
        c.add_point(0.5, 0.3);
        assert!(!c.is_gamma_mode());
        assert_eq!(c.num_points(), 3);
    }

    #[test]
    fn colliding_points_are_nudged() {
        let mut c = ToneCurve::default();
        c.add_point(0.5, 0.5);
        c.add_point(0.5, 0.7);
        let xs: Vec<f32> = c.points().iter().map(|p| p.0).collect();
        assert_eq!(xs.len(), 4);
        for w in xs.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn remove_keeps_two_points() {
        let mut c = ToneCurve::default();
        c.remove_point(0);
        assert_eq!(c.num_points(), 2);
        c.add_point(0.5, 0.5);
        c.remove_point(1);
        assert_eq!(c.num_points(), 2);
    }

    #[test]
    fn smooth_curve_passes_through_control_points() {
        let mut c = ToneCurve::default();
        c.add_point(0.3, 0.8);
        c.add_point(0.6, 0.2);
        c.set_smooth(true);
        for &(x, y) in c.points() {
            assert!(
                (c.precise_value(x) - y.clamp(0.0, 1.0)).abs() < 1e-4,
                "at x = {x}"
            );
        }
    }

    #[test]
    fn invert_reflects_values() {
        let mut c = ToneCurve::default();
        c.add_point(0.4, 0.9);
        c.invert();
        assert_eq!(c.precise_value(0.0), 1.0);
        assert_eq!(c.precise_value(1.0), 0.0);
        assert!((c.precise_value(0.4) - 0.1).abs() < 1e-5);
    }

    #[test]
    fn stretch_maps_histogram_range_to_unit() {
        let mut c = ToneCurve::default();
        c.stretch(0.2, 0.7);
        assert_eq!(c.precise_value(0.2), 0.0);
        assert_eq!(c.precise_value(0.7), 1.0);
        assert_eq!(c.precise_value(0.9), 1.0);
    }

    #[test]
    fn approx_tracks_precise_on_smooth_curve() {
        let mut c = ToneCurve::default();
        c.add_point(0.5, 0.25);
        c.set_smooth(true);
        c.refresh_lut(DEFAULT_LUT_SIZE);
        for i in 0..=50 {
            let x = i as f32 / 50.0;
            assert!((c.approximated_value(x) - c.precise_value(x)).abs() < 0.01);
        }
    }
}
