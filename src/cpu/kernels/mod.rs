//! Host versions of the compute kernels.
//!
//! Every particle kernel maps one invocation to one output particle: it reads
//! the whole source buffer and returns a full copy of its own particle with
//! the stage's fields updated.

use glam::Vec2;

use crate::boundary::{BoundarySample, VolumeMap, sample_boundary};
use crate::gpu::ffi::{GpuSettings, LrParticle, ParticleGridEntry, VolumeMapTransform};
use crate::gpu::sort::{cell_key, cell_of};
use crate::kernel::{cubic, grad_cubic};

pub mod density;
pub mod grid;
pub mod iisph;
pub mod integrate;
pub mod stress;

/// Read-only bindings shared by the neighbour-based stages.
pub struct StageContext<'a> {
    pub settings: &'a GpuSettings,
    pub particles: &'a [LrParticle],
    pub entries: &'a [ParticleGridEntry],
    pub starts: &'a [u32],
    pub maps: &'a [VolumeMap],
    pub transforms: &'a [VolumeMapTransform],
}

impl StageContext<'_> {
    #[inline]
    pub fn h(&self) -> f32 {
        self.settings.kernel_radius
    }

    #[inline]
    pub fn w(&self, r: Vec2) -> f32 {
        cubic(r.length(), self.h())
    }

    #[inline]
    pub fn grad_w(&self, r: Vec2) -> Vec2 {
        grad_cubic(r, self.h())
    }

    #[inline]
    pub fn position(&self, i: usize) -> Vec2 {
        Vec2::from_array(self.particles[i].position)
    }

    pub fn boundary(&self, i: usize) -> BoundarySample {
        let bodies = (self.settings.body_count as usize).min(self.transforms.len());
        sample_boundary(self.maps, &self.transforms[..bodies], self.position(i))
    }

    /// Calls `f(j, x_i - x_j)` for every particle within the kernel radius of
    /// particle `i`, itself included.
    pub fn for_each_neighbour(&self, i: usize, mut f: impl FnMut(usize, Vec2)) {
        let h = self.h();
        let pos = self.position(i);
        let cell = cell_of(pos, h);
        let padded = self.settings.padded_count;

        // colliding cells share a key; walk each key once
        let mut visited = [u32::MAX; 9];
        let mut n_visited = 0;
        for ox in -1..=1 {
            for oy in -1..=1 {
                let key = cell_key(cell + glam::IVec2::new(ox, oy), padded);
                if visited[..n_visited].contains(&key) {
                    continue;
                }
                visited[n_visited] = key;
                n_visited += 1;

                let start = self.starts[key as usize];
                if start == u32::MAX {
                    continue;
                }
                for entry in self.entries[start as usize..].iter().take_while(|e| e.cell_key == key) {
                    let j = entry.particle_index as usize;
                    let r = pos - self.position(j);
                    if r.length_squared() < h * h {
                        f(j, r);
                    }
                }
            }
        }
    }
}

#[inline]
pub(crate) fn mat2(m: [f32; 4]) -> glam::Mat2 {
    glam::Mat2::from_cols_array(&m)
}
