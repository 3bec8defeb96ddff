// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Gauss-Newton circle fitting.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
}

const MAX_ITERATIONS: usize = 50;
const CONVERGENCE_EPS: f64 = 1.0e-7;
const SINGULARITY_EPS: f64 = 1.0e-12;

/// Fits a circle to `points` by Gauss-Newton minimization of the summed
/// squared residuals of the implicit circle equation.
///
/// With `fixed_radius` set, only the center is fitted. `initial_center`
/// seeds the iteration; the default is the point centroid. Fails when the
/// normal equations become singular or the iteration diverges.
pub fn fit_circle(
    points: &[(f32, f32)],
    fixed_radius: Option<f32>,
    initial_center: Option<(f32, f32)>,
) -> Result<Circle> {
    if points.len() < 3 {
        return Err(Error::CircleFitDiverged);
    }

    let (mut cx, mut cy) = match initial_center {
        Some(c) => (c.0 as f64, c.1 as f64),
        None => {
            let n = points.len() as f64;
            let sx: f64 = points.iter().map(|p| p.0 as f64).sum();
            let sy: f64 = points.iter().map(|p| p.1 as f64).sum();
            (sx / n, sy / n)
        }
    };

    let mut r = match fixed_radius {
        Some(r) => r as f64,
        None => {
            // Mean distance to the initial center.
            points
                .iter()
                .map(|p| ((p.0 as f64 - cx).powi(2) + (p.1 as f64 - cy).powi(2)).sqrt())
                .sum::<f64>()
                / points.len() as f64
        }
    };

    for _ in 0..MAX_ITERATIONS {
        // Normal equations J^T J dp = -J^T res for parameters (cx, cy[, r]);
        // residual_i = dist_i - r, d/dcx = -(x_i - cx)/dist_i, d/dr = -1.
        let mut jtj = [[0.0f64; 3]; 3];
        let mut jtr = [0.0f64; 3];

        for p in points {
            let dx = p.0 as f64 - cx;
            let dy = p.1 as f64 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < 1.0e-12 {
                continue;
            }
            let res = dist - r;
            let j = [-dx / dist, -dy / dist, -1.0];
            for a in 0..3 {
                for b in 0..3 {
                    jtj[a][b] += j[a] * j[b];
                }
                jtr[a] += j[a] * res;
            }
        }

        let delta = if fixed_radius.is_some() {
            let d = solve_2x2(
                [[jtj[0][0], jtj[0][1]], [jtj[1][0], jtj[1][1]]],
                [-jtr[0], -jtr[1]],
            )?;
            [d[0], d[1], 0.0]
        } else {
            solve_3x3(jtj, [-jtr[0], -jtr[1], -jtr[2]])?
        };

        cx += delta[0];
        cy += delta[1];
        r += delta[2];

        if !cx.is_finite() || !cy.is_finite() || !r.is_finite() {
            return Err(Error::CircleFitDiverged);
        }

        let step = (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt();
        if step < CONVERGENCE_EPS {
            return Ok(Circle {
                cx: cx as f32,
                cy: cy as f32,
                r: r as f32,
            });
        }
    }

    Err(Error::CircleFitDiverged)
}

fn solve_2x2(m: [[f64; 2]; 2], v: [f64; 2]) -> Result<[f64; 2]> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if det.abs() < SINGULARITY_EPS {
        return Err(Error::CircleFitDiverged);
    }
    Ok([
        (v[0] * m[1][1] - v[1] * m[0][1]) / det,
        (m[0][0] * v[1] - m[1][0] * v[0]) / det,
    ])
}

fn solve_3x3(m: [[f64; 3]; 3], v: [f64; 3]) -> Result<[f64; 3]> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    if det.abs() < SINGULARITY_EPS {
        return Err(Error::CircleFitDiverged);
    }

    let mut out = [0.0f64; 3];
    for col in 0..3 {
        let mut mc = m;
        for row in 0..3 {
            mc[row][col] = v[row];
        }
        let detc = mc[0][0] * (mc[1][1] * mc[2][2] - mc[1][2] * mc[2][1])
            - mc[0][1] * (mc[1][0] * mc[2][2] - mc[1][2] * mc[2][0])
            + mc[0][2] * (mc[1][0] * mc[2][1] - mc[1][1] * mc[2][0]);
        out[col] = detc / det;
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn circle_points(cx: f32, cy: f32, r: f32, n: usize) -> Vec<(f32, f32)> {
        (0..n)
            .map(|i| {
                let a = i as f32 * 2.0 * std::f32::consts::PI / n as f32;
                (cx + r * a.cos(), cy + r * a.sin())
            })
            .collect()
    }

    #[test]
    fn fits_exact_circle() {
        let pts = circle_points(100.0, 50.0, 30.0, 24);
        let c = fit_circle(&pts, None, None).unwrap();
        assert!((c.cx - 100.0).abs() < 1e-3);
        assert!((c.cy - 50.0).abs() < 1e-3);
        assert!((c.r - 30.0).abs() < 1e-3);
    }

    #[test]
    fn fits_partial_arc() {
        let pts: Vec<_> = (0..20)
            .map(|i| {
                let a = 0.3 + i as f32 * 0.05;
                (10.0 + 80.0 * a.cos(), -5.0 + 80.0 * a.sin())
            })
            .collect();
        let c = fit_circle(&pts, None, None).unwrap();
        assert!((c.cx - 10.0).abs() < 0.05);
        assert!((c.cy + 5.0).abs() < 0.05);
        assert!((c.r - 80.0).abs() < 0.05);
    }

    #[test]
    fn fixed_radius_fits_center_only() {
        let pts = circle_points(7.0, 9.0, 42.0, 16);
        let c = fit_circle(&pts, Some(42.0), Some((0.0, 0.0))).unwrap();
        assert!((c.cx - 7.0).abs() < 1e-3);
        assert!((c.cy - 9.0).abs() < 1e-3);
        assert_eq!(c.r, 42.0);
    }

    #[test]
    fn too_few_points_fail() {
        assert!(fit_circle(&[(0.0, 0.0), (1.0, 1.0)], None, None).is_err());
    }

    #[test]
    fn collinear_points_fail() {
        let pts: Vec<_> = (0..10).map(|i| (i as f32, 2.0 * i as f32)).collect();
        assert!(fit_circle(&pts, None, None).is_err());
    }
}
