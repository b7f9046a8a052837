// cubic spline smoothing kernel in 2D, support radius h
use std::f32::consts::PI;

use glam::Vec2;

#[inline]
pub fn cubic(r: f32, h: f32) -> f32 {
    let q = r / h;
    if !(0.0..=1.0).contains(&q) {
        return 0.0;
    }
    let k = 40.0 / (7.0 * PI * h * h);
    if q <= 0.5 {
        let q2 = q * q;
        k * (6.0 * q2 * q - 6.0 * q2 + 1.0)
    } else {
        let f = 1.0 - q;
        k * 2.0 * f * f * f
    }
}

/// Gradient with respect to the first particle, `r = x_i - x_j`.
#[inline]
pub fn grad_cubic(r: Vec2, h: f32) -> Vec2 {
    let r_len = r.length();
    let q = r_len / h;
    if r_len <= 1.0e-9 || q > 1.0 {
        return Vec2::ZERO;
    }
    let l = 240.0 / (7.0 * PI * h * h);
    let grad_q = r / (r_len * h);
    if q <= 0.5 {
        l * q * (3.0 * q - 2.0) * grad_q
    } else {
        let f = 1.0 - q;
        -l * f * f * grad_q
    }
}

/// Kernel integrated along a line at distance `s` from the particle.
///
/// This is the density a half-plane boundary contributes per unit of depth and
/// drives the volume-map profile.
pub fn line_integral(s: f32, h: f32) -> f32 {
    if s.abs() >= h {
        return 0.0;
    }
    const SAMPLES: usize = 64; // even, Simpson
    let t_max = (h * h - s * s).sqrt();
    let step = 2.0 * t_max / SAMPLES as f32;
    let mut acc = 0.0;
    for i in 0..=SAMPLES {
        let t = -t_max + step * i as f32;
        let w = match i {
            0 | SAMPLES => 1.0,
            _ if i % 2 == 1 => 4.0,
            _ => 2.0,
        };
        acc += w * cubic(Vec2::new(s, t).length(), h);
    }
    acc * step / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized() {
        // integrate over the disk with a fine lattice
        let h = 0.3;
        let n = 200;
        let dx = 2.0 * h / n as f32;
        let mut sum = 0.0;
        for iy in 0..=n {
            for ix in 0..=n {
                let p = Vec2::new(-h + ix as f32 * dx, -h + iy as f32 * dx);
                sum += cubic(p.length(), h) * dx * dx;
            }
        }
        assert!((sum - 1.0).abs() < 1.0e-2, "sum = {sum}");
    }

    #[test]
    fn gradient_points_towards_neighbour() {
        let h = 0.3;
        let g = grad_cubic(Vec2::new(0.1, 0.0), h);
        assert!(g.x < 0.0);
        assert_eq!(g.y, 0.0);
        assert_eq!(grad_cubic(Vec2::ZERO, h), Vec2::ZERO);
        assert_eq!(grad_cubic(Vec2::new(0.31, 0.0), h), Vec2::ZERO);
    }

    #[test]
    fn line_integral_sums_to_one() {
        let h = 0.3;
        let n = 400;
        let ds = 2.0 * h / n as f32;
        let total: f32 = (0..n)
            .map(|i| line_integral(-h + (i as f32 + 0.5) * ds, h) * ds)
            .sum();
        assert!((total - 1.0).abs() < 1.0e-2, "total = {total}");
    }
}
