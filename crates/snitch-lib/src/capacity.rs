//! Schedulable container capacity
//!
//! A container needs CPU and memory at the same time, so the number that
//! fits on an instance is capped by whichever resource runs out first.

use crate::models::{resources, Footprint, ResourceValue};

/// How many containers of `unit_cpu` CPU units and `unit_memory` MiB fit in `resources`
///
/// Duplicate `CPU`/`MEMORY` entries are summed after integer division; other
/// resource names (ports, GPUs) are ignored. A zero-sized footprint yields 0.
pub fn containers_possible(unit_cpu: u64, unit_memory: u64, resources: &[ResourceValue]) -> u64 {
    let mut by_cpu = 0u64;
    let mut by_memory = 0u64;

    for resource in resources {
        let value = resource.integer_value.max(0) as u64;
        match resource.name.as_str() {
            resources::CPU => by_cpu += value.checked_div(unit_cpu).unwrap_or(0),
            resources::MEMORY => by_memory += value.checked_div(unit_memory).unwrap_or(0),
            _ => {}
        }
    }

    by_cpu.min(by_memory)
}

/// [`containers_possible`] for a measured footprint
pub fn containers_for(footprint: Footprint, resources: &[ResourceValue]) -> u64 {
    containers_possible(footprint.cpu, footprint.memory, resources)
}
