//! Cell hashing and the pass schedule of the bitonic sort network.
//!
//! The network is the workgroup-local/global split used by GPU bitonic sorts:
//! every block of `2 * workgroup_size` keys is first sorted in local memory,
//! after which each doubling of the stride runs one flip and a disperse
//! cascade. Cascade steps that fit in one workgroup are finished by a single
//! local dispatch.

use glam::{IVec2, Vec2};

use crate::gpu::ffi::{BitonicAlgorithm, BitonicSortParameters};

pub const SORT_WORKGROUP_SIZE: u32 = 256;

#[inline]
pub fn cell_of(pos: Vec2, h: f32) -> IVec2 {
    (pos / h).floor().as_ivec2()
}

/// Hash of a grid cell reduced into `[0, padded_count)`.
#[inline]
pub fn cell_key(cell: IVec2, padded_count: u32) -> u32 {
    let a = (cell.x as u32).wrapping_mul(15_823);
    let b = (cell.y as u32).wrapping_mul(9_737_333);
    a.wrapping_add(b) % padded_count
}

/// Entry array length: the next power of two, at least two.
pub fn padded_count(particle_count: u32) -> u32 {
    particle_count.max(2).next_power_of_two()
}

/// Threads per sort workgroup; each thread compares one pair.
pub fn sort_workgroup_size(padded_count: u32) -> u32 {
    debug_assert!(padded_count.is_power_of_two());
    SORT_WORKGROUP_SIZE.min(padded_count / 2).max(1)
}

/// Workgroups per sort dispatch.
pub fn sort_workgroups(padded_count: u32) -> u32 {
    padded_count / (2 * sort_workgroup_size(padded_count))
}

pub fn bitonic_schedule(padded_count: u32) -> Vec<BitonicSortParameters> {
    debug_assert!(padded_count.is_power_of_two() && padded_count >= 2);
    let local_span = 2 * sort_workgroup_size(padded_count);
    let mut passes = vec![BitonicSortParameters::new(
        local_span,
        BitonicAlgorithm::LocalBitonicMerge,
    )];

    let mut h = local_span * 2;
    while h <= padded_count {
        passes.push(BitonicSortParameters::new(h, BitonicAlgorithm::BigFlip));
        let mut hh = h / 2;
        while hh > 1 {
            if hh <= local_span {
                passes.push(BitonicSortParameters::new(hh, BitonicAlgorithm::LocalDisperse));
                break;
            }
            passes.push(BitonicSortParameters::new(hh, BitonicAlgorithm::BigDisperse));
            hh /= 2;
        }
        h *= 2;
    }
    passes
}
