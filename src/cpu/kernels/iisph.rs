// IISPH pressure solve: predictors, then a fixed number of relaxed Jacobi sweeps
use glam::Vec2;
use rayon::prelude::*;

use crate::cpu::kernels::StageContext;
use crate::gpu::ffi::LrParticle;

const MIN_DIAGONAL: f32 = 1.0e-9;

fn par_map(ctx: &StageContext, f: impl Fn(usize, LrParticle) -> LrParticle + Sync) -> Vec<LrParticle> {
    (0..ctx.particles.len())
        .into_par_iter()
        .map(|i| f(i, ctx.particles[i]))
        .collect()
}

/// Non-pressure velocity, predicted position and the diagonal displacement
/// `d_ii`. Pressure is warm-started from half of the last solve.
pub fn advection(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    let dt = s.dt;
    let gravity = Vec2::from_array(s.gravity);
    par_map(ctx, |i, mut out| {
        let v = Vec2::from_array(out.velocity);
        let v_adv = v + dt * (gravity - s.air_drag * v);
        out.predicted_velocity = v_adv.to_array();
        out.predicted_position = (Vec2::from_array(out.position) + dt * v_adv).to_array();

        let mut sum_grad = Vec2::ZERO;
        ctx.for_each_neighbour(i, |_, r| sum_grad += s.mass * ctx.grad_w(r));
        sum_grad += s.rest_density * ctx.boundary(i).gradient;

        let inv_rho2 = 1.0 / (out.rho * out.rho);
        out.d_ii = (-dt * dt * inv_rho2 * sum_grad).to_array();
        out.p = 0.5 * out.last_p;
        out
    })
}

/// Density after advection and the diagonal `a_ii` of the pressure system.
pub fn density_advection(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    let dt = s.dt;
    par_map(ctx, |i, mut out| {
        let v_i = Vec2::from_array(out.predicted_velocity);
        let d_ii = Vec2::from_array(out.d_ii);
        let inv_rho2 = 1.0 / (out.rho * out.rho);

        let mut rho_adv = out.rho;
        let mut a_ii = 0.0;
        ctx.for_each_neighbour(i, |j, r| {
            if j == i {
                return;
            }
            let grad = ctx.grad_w(r);
            let v_j = Vec2::from_array(ctx.particles[j].predicted_velocity);
            rho_adv += dt * s.mass * (v_i - v_j).dot(grad);
            // displacement of j caused by i's pressure
            let d_ji = dt * dt * s.mass * inv_rho2 * grad;
            a_ii += s.mass * (d_ii - d_ji).dot(grad);
        });

        let boundary = ctx.boundary(i);
        rho_adv += dt * s.rest_density * v_i.dot(boundary.gradient);
        a_ii += s.rest_density * d_ii.dot(boundary.gradient);

        out.density_adv = rho_adv;
        out.a_ii = a_ii;
        out
    })
}

/// `sum_j d_ij p_j`, the off-diagonal pressure displacement.
pub fn dijpj(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    let dt = s.dt;
    par_map(ctx, |i, mut out| {
        let mut sum = Vec2::ZERO;
        ctx.for_each_neighbour(i, |j, r| {
            if j == i {
                return;
            }
            let pj = &ctx.particles[j];
            sum += -dt * dt * s.mass / (pj.rho * pj.rho) * pj.p * ctx.grad_w(r);
        });
        out.dijpj = sum.to_array();
        out
    })
}

/// One relaxed Jacobi update of the pressure, clamped to be non-negative.
pub fn pressure(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    let dt = s.dt;
    par_map(ctx, |i, mut out| {
        if out.a_ii.abs() < MIN_DIAGONAL {
            out.p = 0.0;
            return out;
        }
        let dijpj_i = Vec2::from_array(out.dijpj);
        let inv_rho2 = 1.0 / (out.rho * out.rho);

        let mut sum = 0.0;
        ctx.for_each_neighbour(i, |j, r| {
            if j == i {
                return;
            }
            let pj = &ctx.particles[j];
            let grad = ctx.grad_w(r);
            let d_jj = Vec2::from_array(pj.d_ii);
            let d_ji = dt * dt * s.mass * inv_rho2 * grad;
            let dijpj_j = Vec2::from_array(pj.dijpj);
            sum += s.mass * (dijpj_i - d_jj * pj.p - (dijpj_j - d_ji * out.p)).dot(grad);
        });
        sum += s.rest_density * dijpj_i.dot(ctx.boundary(i).gradient);

        let omega = s.relaxation;
        let p = (1.0 - omega) * out.p + omega / out.a_ii * (s.rest_density - out.density_adv - sum);
        out.p = p.max(0.0);
        out
    })
}

pub fn commit(ctx: &StageContext) -> Vec<LrParticle> {
    par_map(ctx, |_, mut out| {
        out.last_p = out.p;
        out
    })
}
