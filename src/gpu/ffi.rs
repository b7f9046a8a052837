use bytemuck::{Pod, Zeroable};

// Host/kernel shared layouts. Plain arrays instead of glam so the layout stays
// identical to the shader side (std430, every field 4-byte aligned).

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LrParticle {
    pub position: [f32; 2],
    pub predicted_position: [f32; 2],
    pub velocity: [f32; 2],
    pub predicted_velocity: [f32; 2],
    pub pressure_acceleration: [f32; 2],
    pub internal_force: [f32; 2],
    pub d_ii: [f32; 2],
    pub dijpj: [f32; 2],
    pub stress: [f32; 4], // column-major 2x2, shear part only
    pub deviatoric_stress: [f32; 4], // elastic history
    pub rho: f32,
    pub p: f32,
    pub last_p: f32,
    pub volume: f32,
    pub a_ii: f32,
    pub density_adv: f32,
    pub boundary_density: f32,
    pub _pad: f32,
}

impl LrParticle {
    pub fn at(position: [f32; 2], rest_density: f32) -> Self {
        Self { position, predicted_position: position, rho: rest_density, ..Self::default() }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct HrParticle {
    pub position: [f32; 2],
    pub offset: [f32; 2],
    pub velocity: [f32; 2],
    pub parent: u32,
    pub _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct ParticleGridEntry {
    pub particle_index: u32,
    pub cell_key: u32,
}

impl ParticleGridEntry {
    pub const SENTINEL_KEY: u32 = u32::MAX;

    pub const PADDING: Self = Self { particle_index: 0, cell_key: Self::SENTINEL_KEY };

    pub fn is_padding(&self) -> bool {
        self.cell_key == Self::SENTINEL_KEY
    }
}

impl Default for ParticleGridEntry {
    fn default() -> Self {
        Self::PADDING
    }
}

/// Maps world positions into one body's volume-map texture space.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VolumeMapTransform {
    pub origin: [f32; 2], // world position of texel space (0, 0)
    pub scale: [f32; 2], // 1 / world extent
    pub enabled: u32,
    pub _pad: [u32; 3],
}

impl VolumeMapTransform {
    pub fn new(origin: [f32; 2], extent: [f32; 2]) -> Self {
        Self {
            origin,
            scale: [1.0 / extent[0], 1.0 / extent[1]],
            enabled: 1,
            _pad: [0; 3],
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }

    pub fn enabled(self, enabled: bool) -> Self {
        Self { enabled: enabled as u32, ..self }
    }

    /// World position to normalized texture coordinates.
    pub fn to_texture(&self, world: [f32; 2]) -> [f32; 2] {
        [
            (world[0] - self.origin[0]) * self.scale[0],
            (world[1] - self.origin[1]) * self.scale[1],
        ]
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitonicAlgorithm {
    LocalBitonicMerge = 0,
    LocalDisperse = 1,
    BigFlip = 2,
    BigDisperse = 3,
}

impl BitonicAlgorithm {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::LocalBitonicMerge),
            1 => Some(Self::LocalDisperse),
            2 => Some(Self::BigFlip),
            3 => Some(Self::BigDisperse),
            _ => None,
        }
    }
}

/// One pass of the sort network. `h` is the sort stride, not the kernel radius.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BitonicSortParameters {
    pub h: u32,
    pub algorithm: u32,
}

impl BitonicSortParameters {
    pub fn new(h: u32, algorithm: BitonicAlgorithm) -> Self {
        Self { h, algorithm: algorithm as u32 }
    }

    pub fn algorithm(&self) -> Option<BitonicAlgorithm> {
        BitonicAlgorithm::from_u32(self.algorithm)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSettings {
    pub gravity: [f32; 2],
    pub rest_density: f32,
    pub kernel_radius: f32,
    pub mass: f32,
    pub stiffness: f32,
    pub dt: f32,
    pub domain_width: f32,
    pub domain_height: f32,
    pub tan_repose: f32,
    pub viscosity: f32,
    pub cohesion: f32,
    pub air_drag: f32,
    pub relaxation: f32,
    pub particle_count: u32,
    pub padded_count: u32,
    pub body_count: u32,
    pub _pad: [u32; 3],
}

/// Push-constant block shared by every compute kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub settings: GpuSettings,
    pub sort: BitonicSortParameters,
    pub _pad: [u32; 2],
}
