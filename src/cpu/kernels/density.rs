use rayon::prelude::*;

use crate::cpu::kernels::StageContext;
use crate::gpu::ffi::LrParticle;

/// Kernel-weighted mass of the neighbourhood plus the rest-density-weighted
/// boundary volume.
pub fn density(ctx: &StageContext) -> Vec<LrParticle> {
    let s = ctx.settings;
    (0..ctx.particles.len())
        .into_par_iter()
        .map(|i| {
            let mut out = ctx.particles[i];
            let mut rho = 0.0;
            ctx.for_each_neighbour(i, |_, r| rho += s.mass * ctx.w(r));

            let boundary_density = s.rest_density * ctx.boundary(i).volume;
            rho += boundary_density;

            out.rho = rho;
            out.boundary_density = boundary_density;
            out.volume = if rho > 0.0 { s.mass / rho } else { 0.0 };
            out
        })
        .collect()
}
