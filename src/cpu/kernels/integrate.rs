use glam::Vec2;
use rayon::prelude::*;

use crate::gpu::ffi::{GpuSettings, HrParticle, LrParticle};

/// Semi-implicit Euler, then a hard clamp to the domain rectangle.
pub fn integrate(settings: &GpuSettings, particles: &[LrParticle]) -> Vec<LrParticle> {
    let dt = settings.dt;
    let gravity = Vec2::from_array(settings.gravity);
    let max = Vec2::new(settings.domain_width, settings.domain_height);
    particles
        .par_iter()
        .map(|p| {
            let mut out = *p;
            let acc = Vec2::from_array(p.pressure_acceleration)
                + Vec2::from_array(p.internal_force) / settings.mass
                + gravity;
            let mut vel = Vec2::from_array(p.velocity) + dt * acc;
            let mut pos = Vec2::from_array(p.position) + dt * vel;

            if pos.x < 0.0 {
                pos.x = 0.0;
                vel.x = vel.x.max(0.0);
            } else if pos.x > max.x {
                pos.x = max.x;
                vel.x = vel.x.min(0.0);
            }
            if pos.y < 0.0 {
                pos.y = 0.0;
                vel.y = vel.y.max(0.0);
            } else if pos.y > max.y {
                pos.y = max.y;
                vel.y = vel.y.min(0.0);
            }

            out.velocity = vel.to_array();
            out.position = pos.to_array();
            out
        })
        .collect()
}

pub fn hr_advection(lr: &[LrParticle], hr: &mut [HrParticle]) {
    hr.par_iter_mut().for_each(|h| {
        let Some(parent) = lr.get(h.parent as usize) else {
            return;
        };
        h.position = (Vec2::from_array(parent.position) + Vec2::from_array(h.offset)).to_array();
        h.velocity = parent.velocity;
    });
}
