// Execution-port dispatch events and their counter slot placement

use portflow_raw::current_arch::core::{events, CORE_PMU_SLOTS};

use crate::common::PmcCapabilities;
use crate::metrics::port::PortMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEvent {
    pub event: u8,
    pub umask: u8,
    pub metric: PortMetric,
}

/// `UOPS_DISPATCHED_PORT` for every port, in report order
pub const UOPS_DISPATCHED_PORT: &[PortEvent] = &[
    PortEvent {
        event: events::UOPS_DISPATCHED_PORT,
        umask: events::PORT_0,
        metric: PortMetric::Port0,
    },
    PortEvent {
        event: events::UOPS_DISPATCHED_PORT,
        umask: events::PORT_1,
        metric: PortMetric::Port1,
    },
    PortEvent {
        event: events::UOPS_DISPATCHED_PORT,
        umask: events::PORT_2,
        metric: PortMetric::Port2,
    },
    PortEvent {
        event: events::UOPS_DISPATCHED_PORT,
        umask: events::PORT_3,
        metric: PortMetric::Port3,
    },
    PortEvent {
        event: events::UOPS_DISPATCHED_PORT,
        umask: events::PORT_4,
        metric: PortMetric::Port4,
    },
    PortEvent {
        event: events::UOPS_DISPATCHED_PORT,
        umask: events::PORT_5,
        metric: PortMetric::Port5,
    },
];

/// Where an event lives inside a physical core
///
/// Events fill the counters of the first sibling before spilling onto the
/// next one; with `any_thread` set every sibling counts for the whole core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAssignment {
    /// Index of the logical CPU within its core's sibling list
    pub sibling: usize,
    /// Counter slot on that logical CPU
    pub slot: usize,
}

impl SlotAssignment {
    pub fn for_event(event_index: usize, counters_per_cpu: usize) -> Self {
        Self {
            sibling: event_index / counters_per_cpu,
            slot: event_index % counters_per_cpu,
        }
    }
}

/// Counters usable per logical CPU: the reported count, capped by the
/// register tables.
pub fn usable_counters(caps: &PmcCapabilities) -> usize {
    (caps.counters_per_logical_cpu as usize).min(CORE_PMU_SLOTS)
}

/// Siblings a core needs to host `event_count` events
pub fn siblings_required(event_count: usize, counters_per_cpu: usize) -> usize {
    event_count.div_ceil(counters_per_cpu)
}
