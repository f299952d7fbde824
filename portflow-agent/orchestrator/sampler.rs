// Startup control flow and the periodic sampling loop

use std::time::Duration;

use portflow_raw::current_arch::{CPU_FAMILY, CPU_MODEL, MIN_PMU_VERSION};
use tokio_util::sync::CancellationToken;

use crate::common::topology::CONSTANT_TSC_FLAG;
use crate::common::{CpuSignature, Platform, PmcCapabilities, RegisterAccess, Topology};
use crate::counters::port::{CoreSample, PortMonitor, UOPS_DISPATCHED_PORT};
use crate::error::{PortflowError, Result};

/// One emitted tick
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// 1-based tick number
    pub tick: u64,
    pub elapsed_cycles: u64,
    pub cores: Vec<CoreSample>,
}

/// Reject processors other than the validated generation
pub fn check_support(signature: &CpuSignature, caps: &PmcCapabilities) -> Result<()> {
    if caps.version_id < MIN_PMU_VERSION {
        return Err(PortflowError::UnsupportedHardware(format!(
            "architectural performance monitoring version {} < {}",
            caps.version_id, MIN_PMU_VERSION
        )));
    }

    if signature.family != CPU_FAMILY || signature.model != CPU_MODEL {
        return Err(PortflowError::UnsupportedHardware(format!(
            "family = {}, model = {}",
            signature.family, signature.model
        )));
    }

    if caps.counters_per_logical_cpu == 0 {
        return Err(PortflowError::UnsupportedHardware(
            "no general-purpose counters per logical CPU".to_string(),
        ));
    }

    if caps.counter_bit_width == 0 || caps.counter_bit_width > 64 {
        return Err(PortflowError::UnsupportedHardware(format!(
            "counter bit width {} outside 1..=64",
            caps.counter_bit_width
        )));
    }

    Ok(())
}

/// Identify the processor, discover topology, open register handles, and
/// arm the counters
///
/// Nothing is opened unless the processor passes [`check_support`], and
/// nothing is written unless the first logical CPU has `constant_tsc`.
pub fn bootstrap<P, R, D, F>(platform: P, discover: D, open: F) -> Result<Sampler<P, R>>
where
    P: Platform,
    R: RegisterAccess,
    D: FnOnce() -> Result<Topology>,
    F: FnMut(u32) -> Result<R>,
{
    let signature = platform.identify();
    tracing::info!(
        "CPU Family: {}, Model: {}, Stepping: {}",
        signature.family,
        signature.model,
        signature.stepping
    );

    let caps = platform.pmc_capabilities();
    tracing::info!(
        "Version ID of architectural performance monitoring (CPUID.0AH:EAX[7:0]): {}",
        caps.version_id
    );
    tracing::info!(
        "Number of general-purpose performance monitoring counters per logical processor (CPUID.0AH:EAX[15:8]): {}",
        caps.counters_per_logical_cpu
    );
    tracing::info!(
        "Bit width of general-purpose performance monitoring counter (CPUID.0AH:EAX[23:16]): {}",
        caps.counter_bit_width
    );

    check_support(&signature, &caps)?;

    let topology = discover()?;
    if topology.is_empty() {
        return Err(PortflowError::Parse(
            "topology source lists no logical CPUs".to_string(),
        ));
    }
    topology.require_flag(CONSTANT_TSC_FLAG)?;

    if topology.package_count() > 1 {
        tracing::warn!(
            "{} packages detected; logical CPUs are grouped by core id only",
            topology.package_count()
        );
    }

    let monitor = PortMonitor::new(&topology, &caps, UOPS_DISPATCHED_PORT, open)?;
    Sampler::start(platform, monitor)
}

pub struct Sampler<P: Platform, R: RegisterAccess> {
    platform: P,
    monitor: PortMonitor<R>,
    baseline: u64,
    ticks: u64,
}

impl<P: Platform, R: RegisterAccess> Sampler<P, R> {
    /// Program every event, then zero the counters and take the TSC baseline
    pub fn start(platform: P, mut monitor: PortMonitor<R>) -> Result<Self> {
        monitor.program()?;
        monitor.reset()?;
        let baseline = platform.now();

        Ok(Self {
            platform,
            monitor,
            baseline,
            ticks: 0,
        })
    }

    pub fn monitor(&self) -> &PortMonitor<R> {
        &self.monitor
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Take one sample against the previous baseline
    ///
    /// Returns `None` when the TSC has not advanced; the baseline and the
    /// counter readings are then left for the next tick.
    pub fn tick(&mut self) -> Result<Option<Sample>> {
        let now = self.platform.now();
        let elapsed_cycles = now.wrapping_sub(self.baseline);
        if elapsed_cycles == 0 {
            tracing::warn!("TSC did not advance since the last tick, skipping");
            return Ok(None);
        }
        self.baseline = now;

        let cores = self.monitor.sample(elapsed_cycles)?;
        self.ticks += 1;

        Ok(Some(Sample {
            tick: self.ticks,
            elapsed_cycles,
            cores,
        }))
    }

    /// Sample every `interval` until `cancel` fires or `max_ticks` samples
    /// were emitted
    ///
    /// A cancellation during the suspension ends the loop without another
    /// tick. Any register or sink error ends it with that error.
    pub async fn run<S>(
        &mut self,
        interval: Duration,
        max_ticks: Option<u64>,
        cancel: CancellationToken,
        mut sink: S,
    ) -> Result<u64>
    where
        S: FnMut(&Sample) -> Result<()>,
    {
        tracing::info!("Sampling every {:?}", interval);

        loop {
            if max_ticks.is_some_and(|max| self.ticks >= max) {
                tracing::info!("Reached {} ticks, stopping", self.ticks);
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sampling cancelled after {} ticks", self.ticks);
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            if let Some(sample) = self.tick()? {
                sink(&sample)?;
            }
        }

        Ok(self.ticks)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::common::msr::fake::FakeMsr;

    /// Scripted CPUID answers and a TSC that advances by `step` per query
    struct FakePlatform {
        signature: CpuSignature,
        caps: PmcCapabilities,
        tsc: Mutex<u64>,
        step: u64,
    }

    impl FakePlatform {
        fn new(version_id: u32, family: u32, model: u32, counters: u32) -> Self {
            Self {
                signature: CpuSignature {
                    family,
                    model,
                    stepping: 7,
                },
                caps: PmcCapabilities {
                    version_id,
                    counters_per_logical_cpu: counters,
                    counter_bit_width: 48,
                },
                tsc: Mutex::new(0),
                step: 1_000,
            }
        }

        fn sandy_bridge(counters: u32) -> Self {
            Self::new(3, 6, 42, counters)
        }
    }

    impl Platform for FakePlatform {
        fn identify(&self) -> CpuSignature {
            self.signature
        }

        fn pmc_capabilities(&self) -> PmcCapabilities {
            self.caps
        }

        fn now(&self) -> u64 {
            let mut tsc = self.tsc.lock();
            let value = *tsc;
            *tsc += self.step;
            value
        }
    }

    const ONE_CPU: &str = "processor: 0\ncore id: 0\nflags: fpu constant_tsc\n\n";
    const NO_CONSTANT_TSC: &str = "processor: 0\ncore id: 0\nflags: fpu tsc\n\n";

    type Opened = Arc<Mutex<HashMap<u32, FakeMsr>>>;

    fn opener(opened: &Opened) -> impl FnMut(u32) -> Result<FakeMsr> {
        let opened = Arc::clone(opened);
        move |cpu| {
            let msr = FakeMsr::new(cpu);
            opened.lock().insert(cpu, msr.clone());
            Ok(msr)
        }
    }

    fn parse(text: &'static str) -> impl FnOnce() -> Result<Topology> {
        move || Topology::parse(text)
    }

    #[test]
    fn test_check_support() {
        let sig = CpuSignature {
            family: 6,
            model: 42,
            stepping: 7,
        };
        let caps = PmcCapabilities {
            version_id: 3,
            counters_per_logical_cpu: 4,
            counter_bit_width: 48,
        };
        assert!(check_support(&sig, &caps).is_ok());

        let old = PmcCapabilities {
            version_id: 2,
            ..caps
        };
        assert!(matches!(
            check_support(&sig, &old),
            Err(PortflowError::UnsupportedHardware(_))
        ));

        let skylake = CpuSignature { model: 0x5E, ..sig };
        assert!(check_support(&skylake, &caps).is_err());

        let wide = PmcCapabilities {
            counter_bit_width: 72,
            ..caps
        };
        assert!(check_support(&sig, &wide).is_err());
    }

    #[test]
    fn test_end_to_end_single_cpu() {
        let opened = Opened::default();
        let mut sampler =
            bootstrap(FakePlatform::sandy_bridge(8), parse(ONE_CPU), opener(&opened)).unwrap();

        let msr = opened.lock()[&0].clone();
        let writes = msr.writes();
        assert_eq!(writes.len(), 12);
        assert!(writes[..6].iter().all(|(addr, _)| (0x186..=0x18B).contains(addr)));
        assert_eq!(
            writes[6..].to_vec(),
            vec![(0xC1, 0), (0xC2, 0), (0xC3, 0), (0xC4, 0), (0xC5, 0), (0xC6, 0)]
        );

        for (i, addr) in (0xC1..=0xC6).enumerate() {
            msr.set(addr, 125 * i as u64);
        }

        let sample = sampler.tick().unwrap().unwrap();
        assert_eq!(sample.tick, 1);
        assert_eq!(sample.elapsed_cycles, 1_000);
        assert_eq!(sample.cores.len(), 1);
        assert_eq!(
            sample.cores[0].utilization,
            vec![0.0, 12.5, 25.0, 37.5, 50.0, 62.5]
        );
    }

    #[test]
    fn test_unsupported_version_opens_nothing() {
        let opened = Opened::default();
        let result = bootstrap(
            FakePlatform::new(2, 6, 42, 8),
            parse(ONE_CPU),
            opener(&opened),
        );
        assert!(matches!(result, Err(PortflowError::UnsupportedHardware(_))));
        assert!(opened.lock().is_empty());
    }

    #[test]
    fn test_unsupported_model_skips_discovery() {
        let mut discovered = false;
        let result = bootstrap(
            FakePlatform::new(4, 6, 0x5E, 8),
            || {
                discovered = true;
                Topology::parse(ONE_CPU)
            },
            |cpu| Ok(FakeMsr::new(cpu)),
        );
        assert!(matches!(result, Err(PortflowError::UnsupportedHardware(_))));
        assert!(!discovered);
    }

    #[test]
    fn test_missing_constant_tsc_programs_nothing() {
        let opened = Opened::default();
        let result = bootstrap(
            FakePlatform::sandy_bridge(8),
            parse(NO_CONSTANT_TSC),
            opener(&opened),
        );
        assert!(matches!(result, Err(PortflowError::MissingFeature(_))));
        assert!(opened.lock().is_empty());
    }

    #[test]
    fn test_empty_topology_is_parse_error() {
        let result = bootstrap(
            FakePlatform::sandy_bridge(8),
            parse(""),
            |cpu| Ok(FakeMsr::new(cpu)),
        );
        assert!(matches!(result, Err(PortflowError::Parse(_))));
    }

    #[test]
    fn test_malformed_topology_is_parse_error() {
        let opened = Opened::default();
        let result = bootstrap(
            FakePlatform::sandy_bridge(8),
            parse("processor 0\n\n"),
            opener(&opened),
        );
        assert!(matches!(result, Err(PortflowError::Parse(_))));
        assert!(opened.lock().is_empty());
    }

    #[test]
    fn test_stalled_tsc_skips_tick() {
        let opened = Opened::default();
        let platform = FakePlatform {
            step: 0,
            ..FakePlatform::sandy_bridge(8)
        };
        let mut sampler = bootstrap(platform, parse(ONE_CPU), opener(&opened)).unwrap();
        assert!(sampler.tick().unwrap().is_none());
        assert_eq!(sampler.ticks(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_after_max_ticks() {
        let opened = Opened::default();
        let mut sampler =
            bootstrap(FakePlatform::sandy_bridge(8), parse(ONE_CPU), opener(&opened)).unwrap();

        let mut seen = Vec::new();
        let ticks = sampler
            .run(
                Duration::from_millis(1),
                Some(3),
                CancellationToken::new(),
                |sample| {
                    seen.push(sample.tick);
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert_eq!(ticks, 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let opened = Opened::default();
        let mut sampler =
            bootstrap(FakePlatform::sandy_bridge(8), parse(ONE_CPU), opener(&opened)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let ticks = sampler
            .run(Duration::from_secs(3600), None, cancel, |_| Ok(()))
            .await
            .unwrap();
        assert_eq!(ticks, 0);
    }

    #[tokio::test]
    async fn test_run_propagates_register_errors() {
        let opened = Opened::default();
        let mut sampler =
            bootstrap(FakePlatform::sandy_bridge(8), parse(ONE_CPU), opener(&opened)).unwrap();
        opened.lock()[&0].regs.lock().fail_reads = true;

        let result = sampler
            .run(
                Duration::from_millis(1),
                None,
                CancellationToken::new(),
                |_| Ok(()),
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_disarms() {
        let opened = Opened::default();
        let sampler =
            bootstrap(FakePlatform::sandy_bridge(8), parse(ONE_CPU), opener(&opened)).unwrap();
        drop(sampler);

        let msr = opened.lock()[&0].clone();
        for addr in 0x186..=0x18B {
            assert_eq!(msr.get(addr), Some(0));
        }
    }
}
