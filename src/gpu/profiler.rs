use std::time::Duration;

use bevy::log::warn;

use crate::gpu::backend::{CommandList, ComputeBackend};
use crate::settings::FRAMES_IN_FLIGHT;

/// Timestamp queries available to one frame slot.
pub const MAX_QUERY_COUNT: u32 = 64;

/// Labels the timestamps recorded into each slot and turns the raw query
/// values back into per-stage durations once the slot's fence has signaled.
#[derive(Debug, Default)]
pub struct Profiler {
    labels: [Vec<String>; FRAMES_IN_FLIGHT],
    /// Set the first time a stage finds no query left.
    truncated: bool,
}

impl Profiler {
    /// Resets the slot's queries and writes the first timestamp.
    pub fn begin(&mut self, slot: usize, commands: &mut CommandList) {
        self.labels[slot].clear();
        commands.reset_queries(0, MAX_QUERY_COUNT);
        self.timestamp(slot, commands, "frame start");
    }

    /// Returns false once the slot has run out of queries.
    pub fn timestamp(&mut self, slot: usize, commands: &mut CommandList, label: impl Into<String>) -> bool {
        let labels = &mut self.labels[slot];
        if labels.len() >= MAX_QUERY_COUNT as usize {
            if !self.truncated {
                self.truncated = true;
                warn!(
                    "profiling stops after {MAX_QUERY_COUNT} timestamps, later stages such as `{}` are not timed",
                    label.into()
                );
            }
            return false;
        }
        commands.write_timestamp(labels.len() as u32);
        labels.push(label.into());
        true
    }

    /// Whether any frame recorded more stages than there are queries.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn labels(&self, slot: usize) -> &[String] {
        &self.labels[slot]
    }

    /// Time spent between each timestamp and the previous one, labelled by the
    /// later of the two. `None` while the queries are not ready.
    pub fn collect<B: ComputeBackend>(&self, slot: usize, backend: &mut B) -> Option<Vec<(String, Duration)>> {
        let labels = &self.labels[slot];
        if labels.is_empty() {
            return None;
        }
        let raw = backend.query_results(slot, labels.len() as u32)?;
        let period = backend.timestamp_period() as f64;
        Some(
            raw.windows(2)
                .zip(labels.iter().skip(1))
                .map(|(pair, label)| {
                    let ticks = pair[1].saturating_sub(pair[0]);
                    (label.clone(), Duration::from_nanos((ticks as f64 * period) as u64))
                })
                .collect(),
        )
    }
}

/// Timings of the slot that just became available, if any.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub slot: usize,
    pub timings: Option<Vec<(String, Duration)>>,
}

impl FrameReport {
    pub fn total(&self) -> Option<Duration> {
        self.timings.as_ref().map(|t| t.iter().map(|(_, d)| *d).sum())
    }
}
