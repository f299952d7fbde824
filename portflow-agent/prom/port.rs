use prometheus::{Gauge, IntCounter, Registry};
use std::collections::HashMap;
use std::sync::Arc;

use crate::counters::port::PortEvent;
use crate::error::Result;
use crate::metrics::port::PortMetric;
use crate::orchestrator::Sample;

pub struct PortMetricExporter {
    registry: Arc<Registry>,
    events: &'static [PortEvent],
    core_gauges: HashMap<PortMetric, HashMap<u32, Gauge>>,
    elapsed_cycles: Gauge,
    ticks: IntCounter,
}

impl PortMetricExporter {
    pub fn new(core_ids: &[u32], events: &'static [PortEvent]) -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let elapsed_cycles = Gauge::new(
            "ElapsedCycles",
            "TSC cycles covered by the most recent sample",
        )?;
        registry.register(Box::new(elapsed_cycles.clone()))?;

        let ticks = IntCounter::new("SampleTicks", "Number of samples taken")?;
        registry.register(Box::new(ticks.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let mut exporter = Self {
            registry,
            events,
            core_gauges: HashMap::new(),
            elapsed_cycles,
            ticks,
        };

        exporter.register_metrics(core_ids)?;

        Ok(exporter)
    }

    fn register_metrics(&mut self, core_ids: &[u32]) -> Result<()> {
        for event in self.events {
            let metric = event.metric;
            let opts = prometheus::Opts::new(
                metric.name(),
                format!(
                    "Percent of cycles with a uop dispatched (event 0x{:02X}, umask 0x{:02X})",
                    event.event, event.umask
                ),
            );

            let mut core_map = HashMap::new();
            for &core_id in core_ids {
                let gauge =
                    Gauge::with_opts(opts.clone().const_label("core", core_id.to_string()))?;
                self.registry.register(Box::new(gauge.clone()))?;
                core_map.insert(core_id, gauge);
            }
            self.core_gauges.insert(metric, core_map);
        }

        Ok(())
    }

    /// Publish one sample
    pub fn observe(&self, sample: &Sample) {
        self.elapsed_cycles.set(sample.elapsed_cycles as f64);
        self.ticks.inc();

        for core in &sample.cores {
            for (event, &value) in self.events.iter().zip(&core.utilization) {
                if let Some(gauge) = self
                    .core_gauges
                    .get(&event.metric)
                    .and_then(|m| m.get(&core.core_id))
                {
                    gauge.set(value);
                }
            }
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}
