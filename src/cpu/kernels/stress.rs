use glam::{Mat2, Vec2};
use rayon::prelude::*;

use crate::cpu::kernels::{StageContext, mat2};
use crate::gpu::ffi::LrParticle;

#[inline]
fn outer(a: Vec2, b: Vec2) -> Mat2 {
    Mat2::from_cols(a * b.x, a * b.y)
}

/// Second invariant of a deviatoric 2x2 tensor, `sqrt(s:s / 2)`.
#[inline]
pub fn equivalent_shear(s: Mat2) -> f32 {
    let m = s.to_cols_array();
    (0.5 * m.iter().map(|v| v * v).sum::<f32>()).sqrt()
}

/// Scales the trial stress back onto the yield surface when it exceeds
/// `tau_max`.
#[inline]
pub fn return_map(trial: Mat2, tau_max: f32) -> Mat2 {
    let tau = equivalent_shear(trial);
    if tau > tau_max {
        if tau > 0.0 { trial * (tau_max / tau) } else { Mat2::ZERO }
    } else {
        trial
    }
}

/// Pressure acceleration, velocity gradient and the elastoplastic shear
/// stress update.
pub fn stress(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    let dt = s.dt;
    (0..ctx.particles.len())
        .into_par_iter()
        .map(|i| {
            let mut out = ctx.particles[i];
            let p_term_i = out.p / (out.rho * out.rho);
            let v_i = Vec2::from_array(out.predicted_velocity);

            let mut a_p = Vec2::ZERO;
            let mut grad_v = Mat2::ZERO;
            ctx.for_each_neighbour(i, |j, r| {
                if j == i {
                    return;
                }
                let pj = &ctx.particles[j];
                let grad = ctx.grad_w(r);
                a_p -= s.mass * (p_term_i + pj.p / (pj.rho * pj.rho)) * grad;
                let v_j = Vec2::from_array(pj.predicted_velocity);
                grad_v += outer((s.mass / pj.rho) * (v_j - v_i), grad);
            });

            // static boundary: no-slip for the velocity gradient
            let boundary = ctx.boundary(i).gradient;
            a_p -= s.rest_density * p_term_i * boundary;
            grad_v += outer(-v_i, boundary);

            let strain_rate = 0.5 * (grad_v + grad_v.transpose());
            let trace = strain_rate.x_axis.x + strain_rate.y_axis.y;
            let deviatoric = strain_rate - Mat2::from_diagonal(Vec2::splat(0.5 * trace));

            let trial = mat2(out.deviatoric_stress) + 2.0 * s.stiffness * dt * deviatoric;
            let tau_max = out.p.max(0.0) * s.tan_repose + s.cohesion;
            let elastic = return_map(trial, tau_max);

            out.pressure_acceleration = a_p.to_array();
            out.deviatoric_stress = elastic.to_cols_array();
            out.stress = (elastic + 2.0 * s.viscosity * deviatoric).to_cols_array();
            out
        })
        .collect()
}

/// Force from the divergence of the shear stress, plus linear air drag.
pub fn internal_force(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    (0..ctx.particles.len())
        .into_par_iter()
        .map(|i| {
            let mut out = ctx.particles[i];
            let s_i = mat2(out.stress) * (1.0 / (out.rho * out.rho));

            let mut acc = Vec2::ZERO;
            ctx.for_each_neighbour(i, |j, r| {
                if j == i {
                    return;
                }
                let pj = &ctx.particles[j];
                let s_j = mat2(pj.stress) * (1.0 / (pj.rho * pj.rho));
                acc += s.mass * ((s_i + s_j) * ctx.grad_w(r));
            });
            acc += s.rest_density * (s_i * ctx.boundary(i).gradient);

            let v = Vec2::from_array(out.velocity);
            out.internal_force = (s.mass * acc - s.mass * s.air_drag * v).to_array();
            out
        })
        .collect()
}
