use portflow_raw::current_arch::core::{msr, PerfEvtSel};
use portflow_raw::Register;

use crate::common::{PmcCapabilities, RegisterAccess, Topology};
use crate::counters::port::events::{
    siblings_required, usable_counters, PortEvent, SlotAssignment,
};
use crate::error::{PortflowError, Result};
use crate::metrics::port::{counter_delta, utilization};

/// Counter state of one physical core
///
/// Owns one register handle per sibling logical CPU, in topology order, and
/// the last raw reading of every event.
pub struct CoreState<R> {
    pub core_id: u32,
    handles: Vec<R>,
    previous: Vec<u64>,
}

impl<R: RegisterAccess> CoreState<R> {
    pub fn siblings(&self) -> usize {
        self.handles.len()
    }

    pub fn handles(&self) -> &[R] {
        &self.handles
    }
}

/// Per-port utilization of one core over one tick, in catalog order
#[derive(Debug, Clone, PartialEq)]
pub struct CoreSample {
    pub core_id: u32,
    pub utilization: Vec<f64>,
}

pub struct PortMonitor<R: RegisterAccess> {
    cores: Vec<CoreState<R>>,
    events: &'static [PortEvent],
    counters_per_cpu: usize,
    counter_mask: u64,
    armed: bool,
}

impl<R: RegisterAccess> PortMonitor<R> {
    /// Build per-core state and open one register handle per logical CPU
    ///
    /// Every core is checked for enough sibling counters before any handle
    /// is opened. Core ids without logical CPUs are skipped.
    pub fn new<F>(
        topology: &Topology,
        caps: &PmcCapabilities,
        events: &'static [PortEvent],
        mut open: F,
    ) -> Result<Self>
    where
        F: FnMut(u32) -> Result<R>,
    {
        let counters_per_cpu = usable_counters(caps);
        if counters_per_cpu == 0 {
            return Err(PortflowError::UnsupportedHardware(
                "no general-purpose counters per logical CPU".to_string(),
            ));
        }

        let needed = siblings_required(events.len(), counters_per_cpu);
        let grouped = topology.cores();

        for (core_id, siblings) in grouped.iter().enumerate() {
            if !siblings.is_empty() && siblings.len() < needed {
                return Err(PortflowError::Config(format!(
                    "core {core_id} has {} logical CPUs with {counters_per_cpu} counters each, \
                     {} events need {needed}",
                    siblings.len(),
                    events.len()
                )));
            }
        }

        let mut cores = Vec::with_capacity(grouped.len());
        for (core_id, siblings) in grouped.into_iter().enumerate() {
            if siblings.is_empty() {
                tracing::warn!("Core id {} has no logical CPUs, skipping", core_id);
                continue;
            }

            let mut handles = Vec::with_capacity(siblings.len());
            for cpu in siblings {
                handles.push(open(cpu.id)?);
            }

            cores.push(CoreState {
                core_id: core_id as u32,
                handles,
                previous: vec![0; events.len()],
            });
        }

        tracing::info!(
            "Monitoring {} events on {} cores, {} counters per logical CPU",
            events.len(),
            cores.len(),
            counters_per_cpu
        );

        Ok(Self {
            cores,
            events,
            counters_per_cpu,
            counter_mask: caps.counter_mask(),
            armed: false,
        })
    }

    pub fn cores(&self) -> &[CoreState<R>] {
        &self.cores
    }

    pub fn core_ids(&self) -> Vec<u32> {
        self.cores.iter().map(|core| core.core_id).collect()
    }

    pub fn events(&self) -> &'static [PortEvent] {
        self.events
    }

    fn assignment(&self, event_index: usize) -> SlotAssignment {
        SlotAssignment::for_event(event_index, self.counters_per_cpu)
    }

    /// PERFEVTSEL writes needed to arm every event, as (sibling, register)
    pub fn programming_plan(&self) -> Result<Vec<(usize, Register<PerfEvtSel>)>> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let slot = self.assignment(i);
                let reg = Register::new(
                    msr::IA32_PERFEVTSEL[slot.slot],
                    PerfEvtSel::counting_any_thread(event.event, event.umask),
                );
                reg.validate().map_err(|e| {
                    PortflowError::Config(format!("event {}: {e}", event.metric.name()))
                })?;
                Ok((slot.sibling, reg))
            })
            .collect()
    }

    /// Write the event configuration of every slot on every core
    pub fn program(&mut self) -> Result<()> {
        let plan = self.programming_plan()?;

        // Set before writing so a partial failure is still undone on drop
        self.armed = true;
        for core in &mut self.cores {
            for (sibling, reg) in &plan {
                core.handles[*sibling].write(reg.address, reg.to_msr_value())?;
            }
            tracing::info!("Programmed {} port events on core {}", plan.len(), core.core_id);
        }

        Ok(())
    }

    /// Zero every programmed counter and forget previous readings
    pub fn reset(&mut self) -> Result<()> {
        let assignments: Vec<SlotAssignment> =
            (0..self.events.len()).map(|i| self.assignment(i)).collect();

        for core in &mut self.cores {
            for (i, slot) in assignments.iter().enumerate() {
                core.handles[slot.sibling].write(msr::IA32_PMC[slot.slot], 0)?;
                core.previous[i] = 0;
            }
        }

        Ok(())
    }

    /// Read every counter and convert the deltas since the previous call
    /// into percentages of `elapsed_cycles`
    pub fn sample(&mut self, elapsed_cycles: u64) -> Result<Vec<CoreSample>> {
        let assignments: Vec<SlotAssignment> =
            (0..self.events.len()).map(|i| self.assignment(i)).collect();
        let mask = self.counter_mask;

        let mut samples = Vec::with_capacity(self.cores.len());
        for core in &mut self.cores {
            let mut percentages = Vec::with_capacity(assignments.len());
            for (i, slot) in assignments.iter().enumerate() {
                let raw = core.handles[slot.sibling].read(msr::IA32_PMC[slot.slot])? & mask;
                let delta = counter_delta(core.previous[i], raw, mask);
                core.previous[i] = raw;
                percentages.push(utilization(delta, elapsed_cycles));
            }
            samples.push(CoreSample {
                core_id: core.core_id,
                utilization: percentages,
            });
        }

        Ok(samples)
    }

    /// Clear every PERFEVTSEL this monitor programmed
    ///
    /// A failed write does not stop the remaining slots from being cleared;
    /// the first failure is returned once every slot was attempted.
    pub fn disarm(&mut self) -> Result<()> {
        if !self.armed {
            return Ok(());
        }

        let assignments: Vec<SlotAssignment> =
            (0..self.events.len()).map(|i| self.assignment(i)).collect();

        let mut first_error = None;
        for core in &mut self.cores {
            for slot in &assignments {
                let handle = &mut core.handles[slot.sibling];
                if let Err(e) = handle.write(msr::IA32_PERFEVTSEL[slot.slot], 0) {
                    tracing::warn!(
                        "Failed to clear PERFEVTSEL{} on CPU {}: {}",
                        slot.slot,
                        handle.cpu(),
                        e
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        self.armed = false;
        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("Disarmed port counters on {} cores", self.cores.len());
                Ok(())
            }
        }
    }
}

impl<R: RegisterAccess> Drop for PortMonitor<R> {
    fn drop(&mut self) {
        if let Err(e) = self.disarm() {
            tracing::warn!("Failed to disarm port counters: {}", e);
        }
    }
}
