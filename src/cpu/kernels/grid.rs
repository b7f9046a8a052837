use rayon::prelude::*;

use crate::gpu::ffi::{BitonicAlgorithm, BitonicSortParameters, GpuSettings, LrParticle, ParticleGridEntry};
use crate::gpu::sort::{cell_key, cell_of};

/// One entry per padded slot; also clears the starting indices.
pub fn grid_init(
    settings: &GpuSettings,
    particles: &[LrParticle],
    entries: &mut [ParticleGridEntry],
    starts: &mut [u32],
) {
    let n = (settings.particle_count as usize).min(particles.len());
    entries.par_iter_mut().enumerate().for_each(|(i, entry)| {
        *entry = if i < n {
            let pos = glam::Vec2::from_array(particles[i].position);
            ParticleGridEntry {
                particle_index: i as u32,
                cell_key: cell_key(cell_of(pos, settings.kernel_radius), settings.padded_count),
            }
        } else {
            ParticleGridEntry::PADDING
        };
    });
    starts.par_iter_mut().for_each(|s| *s = u32::MAX);
}

#[inline]
fn compare_and_swap(entries: &mut [ParticleGridEntry], i: usize, j: usize) {
    if entries[i].cell_key > entries[j].cell_key {
        entries.swap(i, j);
    }
}

/// Mirror compare inside each run of `h`: first against last, inwards.
fn flip(entries: &mut [ParticleGridEntry], h: usize) {
    for block in entries.chunks_mut(h) {
        for t in 0..h / 2 {
            compare_and_swap(block, t, h - 1 - t);
        }
    }
}

/// Compare `h / 2` apart inside each run of `h`.
fn disperse(entries: &mut [ParticleGridEntry], h: usize) {
    for block in entries.chunks_mut(h) {
        for t in 0..h / 2 {
            compare_and_swap(block, t, t + h / 2);
        }
    }
}

/// Runs one pass of the network. Local passes work on independent blocks of
/// `entries.len() / workgroups` keys, the way a workgroup owns its slice of
/// shared memory.
pub fn bitonic_pass(entries: &mut [ParticleGridEntry], params: BitonicSortParameters, workgroups: u32) {
    let h = params.h as usize;
    let Some(algorithm) = params.algorithm() else {
        return;
    };
    let block = (entries.len() / workgroups.max(1) as usize).max(2);

    match algorithm {
        BitonicAlgorithm::LocalBitonicMerge => entries.par_chunks_mut(block).for_each(|local| {
            let mut hh = 2;
            while hh <= h.min(local.len()) {
                flip(local, hh);
                let mut dd = hh / 2;
                while dd >= 2 {
                    disperse(local, dd);
                    dd /= 2;
                }
                hh *= 2;
            }
        }),
        BitonicAlgorithm::LocalDisperse => entries.par_chunks_mut(block).for_each(|local| {
            let mut dd = h.min(local.len());
            while dd >= 2 {
                disperse(local, dd);
                dd /= 2;
            }
        }),
        BitonicAlgorithm::BigFlip => entries.par_chunks_mut(h).for_each(|run| flip(run, h)),
        BitonicAlgorithm::BigDisperse => entries.par_chunks_mut(h).for_each(|run| disperse(run, h)),
    }
}

/// `starts[key]` = first sorted position of each non-padding key.
pub fn starting_indices(entries: &[ParticleGridEntry], starts: &mut [u32]) {
    let firsts: Vec<(u32, u32)> = entries
        .par_iter()
        .enumerate()
        .filter(|(i, e)| !e.is_padding() && (*i == 0 || entries[i - 1].cell_key != e.cell_key))
        .map(|(i, e)| (e.cell_key, i as u32))
        .collect();
    for (key, index) in firsts {
        if let Some(start) = starts.get_mut(key as usize) {
            *start = index;
        }
    }
}
