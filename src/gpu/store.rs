use glam::Vec2;

use crate::error::BackendError;
use crate::gpu::backend::{Bindings, BufferRef, BufferRole, ComputeBackend, Ping};
use crate::gpu::ffi::{HrParticle, LrParticle, ParticleGridEntry, VolumeMapTransform};
use crate::gpu::sort::padded_count;
use crate::settings::{FRAMES_IN_FLIGHT, SphSettings};

/// HR particles spawned per LR particle.
pub const HR_OFFSETS_PER_PARTICLE: usize = 5;

/// Centre plus the four diagonals at a quarter of the lattice spacing.
pub fn hr_offsets(spacing: f32) -> [Vec2; HR_OFFSETS_PER_PARTICLE] {
    let q = 0.25 * spacing;
    [
        Vec2::ZERO,
        Vec2::new(-q, -q),
        Vec2::new(q, -q),
        Vec2::new(-q, q),
        Vec2::new(q, q),
    ]
}

// ==================== arena ==========================================

/// Which LR buffer of a slot holds the latest state.
///
/// Stages read `current` and write `current.other()`; the orchestrator flips
/// after every stage that writes LR data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingPong {
    current: Ping,
}

impl PingPong {
    pub fn starting_at(current: Ping) -> Self {
        Self { current }
    }

    pub fn current(&self) -> Ping {
        self.current
    }

    /// Bindings of a stage that leaves the LR buffers untouched.
    pub fn bindings(&self) -> Bindings {
        Bindings { src: self.current, dst: self.current.other() }
    }

    /// Bindings for an LR-writing stage; the written buffer becomes current.
    pub fn advance(&mut self) -> Bindings {
        let bindings = self.bindings();
        self.current = bindings.dst;
        bindings
    }
}

// =====================================================================

/// Host copy of the particle state plus the per-slot GPU bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct ParticleStore {
    pub lr: Vec<LrParticle>,
    pub hr: Vec<HrParticle>,
    pub spacing: f32,
    committed: [Ping; FRAMES_IN_FLIGHT],
}

impl ParticleStore {
    pub fn new(spacing: f32) -> Self {
        Self { spacing, ..Self::default() }
    }

    /// Regular block of `n_x * n_y` particles at rest, lower-left at `origin`.
    pub fn init_grid(&mut self, origin: Vec2, n_x: usize, n_y: usize, rest_density: f32) {
        for iy in 0..n_y {
            for ix in 0..n_x {
                let pos = origin + Vec2::new(ix as f32, iy as f32) * self.spacing;
                self.lr.push(LrParticle::at(pos.to_array(), rest_density));
            }
        }
        self.rebuild_hr();
    }

    pub fn block(settings: &SphSettings, origin: Vec2, n_x: usize, n_y: usize) -> Self {
        let mut store = Self::new(settings.particle_spacing);
        store.init_grid(origin, n_x, n_y, settings.rest_density);
        store
    }

    fn rebuild_hr(&mut self) {
        let offsets = hr_offsets(self.spacing);
        self.hr = (0..self.lr.len() * HR_OFFSETS_PER_PARTICLE)
            .map(|i| {
                let parent = &self.lr[i / HR_OFFSETS_PER_PARTICLE];
                let offset = offsets[i % HR_OFFSETS_PER_PARTICLE];
                HrParticle {
                    position: (Vec2::from_array(parent.position) + offset).to_array(),
                    offset: offset.to_array(),
                    velocity: parent.velocity,
                    parent: (i / HR_OFFSETS_PER_PARTICLE) as u32,
                    _pad: 0,
                }
            })
            .collect();
    }

    pub fn particle_count(&self) -> u32 {
        self.lr.len() as u32
    }

    pub fn hr_count(&self) -> u32 {
        self.hr.len() as u32
    }

    pub fn padded_count(&self) -> u32 {
        padded_count(self.particle_count())
    }

    pub fn is_empty(&self) -> bool {
        self.lr.is_empty()
    }

    pub fn committed(&self, slot: usize) -> Ping {
        self.committed[slot]
    }

    pub fn set_committed(&mut self, slot: usize, ping: Ping) {
        self.committed[slot] = ping;
    }

    /// Byte size of every buffer a frame slot owns.
    pub fn buffer_layout(&self, body_count: usize) -> Vec<(BufferRole, usize)> {
        let lr_size = self.lr.len() * size_of::<LrParticle>();
        let padded = self.padded_count() as usize;
        vec![
            (BufferRole::Lr(Ping::A), lr_size),
            (BufferRole::Lr(Ping::B), lr_size),
            (BufferRole::Hr, self.hr.len() * size_of::<HrParticle>()),
            (BufferRole::GridEntries, padded * size_of::<ParticleGridEntry>()),
            (BufferRole::StartingIndices, padded * size_of::<u32>()),
            (BufferRole::VolumeMapTransforms, transform_buffer_size(body_count)),
        ]
    }

    /// Creates every slot's buffers and seeds ping A with the initial state.
    pub fn allocate<B: ComputeBackend>(&mut self, backend: &mut B, body_count: usize) -> Result<(), BackendError> {
        for slot in 0..FRAMES_IN_FLIGHT {
            for (role, size) in self.buffer_layout(body_count) {
                backend.create_buffer(BufferRef::new(slot, role), size)?;
            }
            backend.write_buffer(BufferRef::new(slot, BufferRole::Lr(Ping::A)), bytemuck::cast_slice(&self.lr))?;
            backend.write_buffer(BufferRef::new(slot, BufferRole::Lr(Ping::B)), bytemuck::cast_slice(&self.lr))?;
            backend.write_buffer(BufferRef::new(slot, BufferRole::Hr), bytemuck::cast_slice(&self.hr))?;
            self.committed[slot] = Ping::A;
        }
        Ok(())
    }

    pub fn release<B: ComputeBackend>(&self, backend: &mut B, body_count: usize) {
        for slot in 0..FRAMES_IN_FLIGHT {
            for (role, _) in self.buffer_layout(body_count) {
                backend.destroy_buffer(BufferRef::new(slot, role));
            }
        }
    }
}

/// Transform buffers never shrink below one entry so a scene without bodies
/// still binds something.
pub fn transform_buffer_size(body_count: usize) -> usize {
    body_count.max(1) * size_of::<VolumeMapTransform>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hr_particles_follow_their_parent() {
        let store = ParticleStore::block(&SphSettings::default(), Vec2::new(1.0, 1.0), 3, 3);
        for (i, hr) in store.hr.iter().enumerate() {
            assert_eq!(hr.parent as usize, i / HR_OFFSETS_PER_PARTICLE);
            let parent = Vec2::from_array(store.lr[hr.parent as usize].position);
            let pos = Vec2::from_array(hr.position);
            assert!((pos - parent - Vec2::from_array(hr.offset)).length() < 1.0e-6);
        }
        assert_eq!(store.hr[0].offset, [0.0, 0.0]);
    }

    #[test]
    fn arena_alternates() {
        let mut arena = PingPong::default();
        assert_eq!(arena.advance(), Bindings { src: Ping::A, dst: Ping::B });
        assert_eq!(arena.bindings(), Bindings { src: Ping::B, dst: Ping::A });
        assert_eq!(arena.advance().dst, Ping::A);
        assert_eq!(arena.current(), Ping::A);
    }
}
