//! Rigid boundaries as precomputed volume maps.
//!
//! Each body is baked once into a [`VolumeMap`]. What changes at runtime is
//! only which bodies are active, captured by an immutable [`BoundarySnapshot`]
//! the orchestrator reads at the start of a frame.

use std::sync::Arc;

use glam::Vec2;

use crate::gpu::ffi::VolumeMapTransform;
use crate::settings::SphSettings;

pub mod body;
pub mod volume_map;

pub use body::{Aabb, MeshDistance, RigidBody, Shape, TriangleMesh2D};
pub use volume_map::{VOLUME_MAP_TEXELS_PER_RADIUS, VolumeMap, VolumeProfile};

/// Summed boundary contribution at one position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundarySample {
    pub volume: f32,
    pub gradient: Vec2,
}

/// Adds up every enabled body whose map covers `world`.
pub fn sample_boundary(
    maps: &[VolumeMap],
    transforms: &[VolumeMapTransform],
    world: Vec2,
) -> BoundarySample {
    let mut sample = BoundarySample::default();
    for (map, transform) in maps.iter().zip(transforms) {
        if !transform.is_enabled() {
            continue;
        }
        let texel = map.sample(transform.to_texture(world.to_array()));
        sample.volume += texel[0];
        sample.gradient += Vec2::new(texel[1], texel[2]);
    }
    sample
}

#[derive(Clone, Debug)]
pub struct BoundarySnapshot {
    maps: Arc<[VolumeMap]>,
    transforms: Arc<[VolumeMapTransform]>,
}

impl Default for BoundarySnapshot {
    fn default() -> Self {
        Self { maps: Arc::from(Vec::new()), transforms: Arc::from(Vec::new()) }
    }
}

impl BoundarySnapshot {
    pub fn build(bodies: &[RigidBody], settings: &SphSettings) -> Self {
        let domain = Aabb::new(Vec2::ZERO, Vec2::new(settings.domain_width, settings.domain_height));
        let maps: Vec<VolumeMap> = bodies
            .iter()
            .map(|body| VolumeMap::build(body, domain, settings.kernel_radius))
            .collect();
        let transforms: Vec<VolumeMapTransform> = maps
            .iter()
            .zip(bodies)
            .map(|(map, body)| map.transform(body.enabled))
            .collect();
        Self { maps: maps.into(), transforms: transforms.into() }
    }

    /// New snapshot sharing the baked maps, with one flag per body.
    pub fn with_enabled(&self, enabled: &[bool]) -> Self {
        let transforms: Vec<VolumeMapTransform> = self
            .transforms
            .iter()
            .enumerate()
            .map(|(i, t)| t.enabled(enabled.get(i).copied().unwrap_or(t.is_enabled())))
            .collect();
        Self { maps: Arc::clone(&self.maps), transforms: transforms.into() }
    }

    pub fn with_body_enabled(&self, index: usize, enabled: bool) -> Self {
        let mut flags: Vec<bool> = self.transforms.iter().map(|t| t.is_enabled()).collect();
        if let Some(flag) = flags.get_mut(index) {
            *flag = enabled;
        }
        self.with_enabled(&flags)
    }

    pub fn maps(&self) -> &[VolumeMap] {
        &self.maps
    }

    pub fn transforms(&self) -> &[VolumeMapTransform] {
        &self.transforms
    }

    pub fn body_count(&self) -> usize {
        self.maps.len()
    }

    pub fn shares_maps(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.maps, &other.maps)
    }

    pub fn sample(&self, world: Vec2) -> BoundarySample {
        sample_boundary(&self.maps, &self.transforms, world)
    }
}
