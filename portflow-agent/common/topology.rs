// Logical CPU topology parsed from /proc/cpuinfo

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use crate::error::{PortflowError, Result};

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Flag that guarantees the TSC ticks at a constant rate across P-states
pub const CONSTANT_TSC_FLAG: &str = "constant_tsc";

/// One `processor` record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalCpu {
    pub id: u32,
    pub core_id: u32,
    pub package_id: u32,
    pub family: Option<u32>,
    pub model: Option<u32>,
    pub flags: BTreeSet<String>,
}

impl LogicalCpu {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }
}

/// Record under construction while scanning a block
#[derive(Default)]
struct RecordBuilder {
    started: bool,
    id: Option<u32>,
    cpu: LogicalCpu,
}

impl RecordBuilder {
    fn apply(&mut self, key: &str, value: &str, line_no: usize) -> Result<()> {
        self.started = true;
        match key {
            "processor" => self.id = Some(parse_field(key, value, line_no)?),
            "core id" => self.cpu.core_id = parse_field(key, value, line_no)?,
            "physical id" => self.cpu.package_id = parse_field(key, value, line_no)?,
            "cpu family" => self.cpu.family = Some(parse_field(key, value, line_no)?),
            "model" => self.cpu.model = Some(parse_field(key, value, line_no)?),
            "flags" => {
                self.cpu.flags = value.split_whitespace().map(str::to_owned).collect();
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self, line_no: usize) -> Result<Option<LogicalCpu>> {
        if !self.started {
            return Ok(None);
        }
        let id = self.id.ok_or_else(|| {
            PortflowError::Parse(format!(
                "record ending at line {line_no} has no processor id"
            ))
        })?;
        Ok(Some(LogicalCpu { id, ..self.cpu }))
    }
}

fn parse_field<T: FromStr>(key: &str, value: &str, line_no: usize) -> Result<T> {
    value.parse().map_err(|_| {
        PortflowError::Parse(format!(
            "line {line_no}: invalid value {value:?} for {key:?}"
        ))
    })
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

/// Snapshot of every logical CPU, in the order they were listed
#[derive(Debug, Clone, Default)]
pub struct Topology {
    cpus: Vec<LogicalCpu>,
}

impl Topology {
    /// Read and parse the topology source at `path`
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let topology = Self::parse(&text)?;

        tracing::info!(
            "Discovered {} logical CPUs on {} cores from {}",
            topology.cpus.len(),
            topology.num_cores(),
            path.display()
        );

        Ok(topology)
    }

    /// Parse blank-line separated `key: value` records
    ///
    /// Unknown keys are ignored. A line without a `:` fails the whole parse.
    pub fn parse(text: &str) -> Result<Self> {
        let mut cpus = Vec::new();
        let mut record = RecordBuilder::default();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;

            if trim(line).is_empty() {
                if let Some(cpu) = std::mem::take(&mut record).finish(line_no)? {
                    cpus.push(cpu);
                }
                continue;
            }

            let (key, value) = line.split_once(':').ok_or_else(|| {
                PortflowError::Parse(format!("line {line_no}: expected `key: value`, got {line:?}"))
            })?;

            record.apply(trim(key), trim(value), line_no)?;
        }

        if let Some(cpu) = record.finish(text.lines().count())? {
            cpus.push(cpu);
        }

        Ok(Self { cpus })
    }

    pub fn cpus(&self) -> &[LogicalCpu] {
        &self.cpus
    }

    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// `1 + max(core id)`, or 0 for an empty topology
    pub fn num_cores(&self) -> usize {
        self.cpus
            .iter()
            .map(|cpu| cpu.core_id as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Logical CPUs grouped by core id, indexed `0..num_cores()`
    ///
    /// Siblings keep their listing order. Core ids with no logical CPU map
    /// to an empty group.
    pub fn cores(&self) -> Vec<Vec<&LogicalCpu>> {
        let mut cores = vec![Vec::new(); self.num_cores()];
        for cpu in &self.cpus {
            cores[cpu.core_id as usize].push(cpu);
        }
        cores
    }

    pub fn package_count(&self) -> usize {
        self.cpus
            .iter()
            .map(|cpu| cpu.package_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Fail unless the first logical CPU advertises `flag`
    pub fn require_flag(&self, flag: &str) -> Result<()> {
        match self.cpus.first() {
            Some(cpu) if cpu.has_flag(flag) => Ok(()),
            Some(cpu) => Err(PortflowError::MissingFeature(format!(
                "{flag} is not available on CPU {}",
                cpu.id
            ))),
            None => Err(PortflowError::MissingFeature(format!(
                "{flag} cannot be checked: no logical CPUs"
            ))),
        }
    }
}
