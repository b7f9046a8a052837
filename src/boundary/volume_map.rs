use glam::Vec2;
use rayon::prelude::*;

use crate::boundary::body::{Aabb, RigidBody};
use crate::gpu::ffi::VolumeMapTransform;
use crate::kernel::line_integral;

/// Texel density of a volume map relative to the kernel radius.
pub const VOLUME_MAP_TEXELS_PER_RADIUS: f32 = 8.0;

const PROFILE_SAMPLES: usize = 128;

/// Boundary volume as a function of signed distance, tabulated once per radius.
///
/// `volume(d)` integrates the kernel line integral from `d` to `h`, so a
/// particle on a flat surface sees half of its support inside the body.
#[derive(Clone, Debug)]
pub struct VolumeProfile {
    h: f32,
    line: Vec<f32>,
    volume: Vec<f32>,
}

impl VolumeProfile {
    pub fn new(h: f32) -> Self {
        let step = 2.0 * h / PROFILE_SAMPLES as f32;
        let line: Vec<f32> = (0..=PROFILE_SAMPLES)
            .map(|i| line_integral(-h + step * i as f32, h))
            .collect();

        // trapezoid from the far end back towards -h
        let mut volume = vec![0.0; PROFILE_SAMPLES + 1];
        for i in (0..PROFILE_SAMPLES).rev() {
            volume[i] = volume[i + 1] + 0.5 * (line[i] + line[i + 1]) * step;
        }
        Self { h, line, volume }
    }

    /// Returns `(volume, line integral)` at signed distance `d`.
    pub fn eval(&self, d: f32) -> (f32, f32) {
        if d >= self.h {
            return (0.0, 0.0);
        }
        if d <= -self.h {
            return (self.volume[0], 0.0);
        }
        let x = (d + self.h) / (2.0 * self.h) * PROFILE_SAMPLES as f32;
        let i = (x.floor() as usize).min(PROFILE_SAMPLES - 1);
        let t = x - i as f32;
        (
            self.volume[i] + (self.volume[i + 1] - self.volume[i]) * t,
            self.line[i] + (self.line[i + 1] - self.line[i]) * t,
        )
    }
}

/// Precomputed per-body image: `[volume, grad.x, grad.y, signed distance]`.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMap {
    pub origin: Vec2,
    pub extent: Vec2,
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl VolumeMap {
    /// Samples the body over its bounds grown by two kernel radii.
    pub fn build(body: &RigidBody, domain: Aabb, h: f32) -> Self {
        let profile = VolumeProfile::new(h);
        let bounds = body.bounds(domain).expanded(2.0 * h);
        let texel = h / VOLUME_MAP_TEXELS_PER_RADIUS;
        let width = ((bounds.extent().x / texel).ceil() as u32).max(2);
        let height = ((bounds.extent().y / texel).ceil() as u32).max(2);

        let texels = (0..width * height)
            .into_par_iter()
            .map(|idx| {
                let cell = Vec2::new((idx % width) as f32 + 0.5, (idx / width) as f32 + 0.5);
                let p = bounds.min + cell * texel;
                let (d, n) = body.signed_distance(p);
                let (volume, line) = profile.eval(d);
                // volume falls off along the outward normal
                [volume, -line * n.x, -line * n.y, d]
            })
            .collect();

        Self {
            origin: bounds.min,
            extent: Vec2::new(width as f32, height as f32) * texel,
            width,
            height,
            texels,
        }
    }

    pub fn transform(&self, enabled: bool) -> VolumeMapTransform {
        VolumeMapTransform::new(self.origin.to_array(), self.extent.to_array()).enabled(enabled)
    }

    fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Bilinear lookup at normalized coordinates. Zero outside the unit square.
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        if !(0.0..=1.0).contains(&uv[0]) || !(0.0..=1.0).contains(&uv[1]) {
            return [0.0; 4];
        }
        let fx = (uv[0] * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let fy = (uv[1] * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
        let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

        let (a, b, c, d) = (self.texel(x0, y0), self.texel(x1, y0), self.texel(x0, y1), self.texel(x1, y1));
        std::array::from_fn(|k| {
            let bottom = a[k] + (b[k] - a[k]) * tx;
            let top = c[k] + (d[k] - c[k]) * tx;
            bottom + (top - bottom) * ty
        })
    }
}
