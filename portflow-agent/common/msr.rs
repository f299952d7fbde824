use portflow_raw::MsrDevice;

use crate::error::Result;

/// Register file of one logical CPU
///
/// Implemented by [`MsrDevice`] for real hardware. Counter programming and
/// sampling are written against this trait so they can run on scripted
/// register files in tests.
pub trait RegisterAccess {
    /// Logical CPU the register file belongs to
    fn cpu(&self) -> u32;

    fn read(&self, addr: u64) -> Result<u64>;

    fn write(&mut self, addr: u64, value: u64) -> Result<()>;
}

impl RegisterAccess for MsrDevice {
    fn cpu(&self) -> u32 {
        MsrDevice::cpu(self)
    }

    fn read(&self, addr: u64) -> Result<u64> {
        let value = MsrDevice::read(self, addr)?;
        tracing::debug!(
            "MSR read: CPU {} MSR 0x{:08x} = 0x{:016x}",
            self.cpu(),
            addr,
            value
        );
        Ok(value)
    }

    fn write(&mut self, addr: u64, value: u64) -> Result<()> {
        tracing::debug!(
            "MSR write: CPU {} MSR 0x{:08x} <- 0x{:016x}",
            MsrDevice::cpu(self),
            addr,
            value
        );
        MsrDevice::write(self, addr, value)?;
        Ok(())
    }
}

/// Open the MSR device of `cpu`
pub fn open(cpu: u32) -> Result<MsrDevice> {
    let device = MsrDevice::open(cpu)?;
    tracing::info!("Opened MSR handle for logical CPU {}", cpu);
    Ok(device)
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted register files shared between a test and the code under test

    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::RegisterAccess;
    use crate::error::{PortflowError, Result};

    #[derive(Debug, Default)]
    pub struct FakeRegisters {
        pub values: HashMap<u64, u64>,
        pub writes: Vec<(u64, u64)>,
        pub fail_reads: bool,
        pub fail_writes: bool,
    }

    #[derive(Debug, Clone)]
    pub struct FakeMsr {
        cpu: u32,
        pub regs: Arc<Mutex<FakeRegisters>>,
    }

    impl FakeMsr {
        pub fn new(cpu: u32) -> Self {
            Self {
                cpu,
                regs: Arc::new(Mutex::new(FakeRegisters::default())),
            }
        }

        pub fn set(&self, addr: u64, value: u64) {
            self.regs.lock().values.insert(addr, value);
        }

        pub fn get(&self, addr: u64) -> Option<u64> {
            self.regs.lock().values.get(&addr).copied()
        }

        pub fn writes(&self) -> Vec<(u64, u64)> {
            self.regs.lock().writes.clone()
        }
    }

    impl RegisterAccess for FakeMsr {
        fn cpu(&self) -> u32 {
            self.cpu
        }

        fn read(&self, addr: u64) -> Result<u64> {
            let regs = self.regs.lock();
            if regs.fail_reads {
                return Err(PortflowError::Io(std::io::Error::from(
                    std::io::ErrorKind::UnexpectedEof,
                )));
            }
            Ok(regs.values.get(&addr).copied().unwrap_or(0))
        }

        fn write(&mut self, addr: u64, value: u64) -> Result<()> {
            let mut regs = self.regs.lock();
            if regs.fail_writes {
                return Err(PortflowError::Io(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                )));
            }
            regs.values.insert(addr, value);
            regs.writes.push((addr, value));
            Ok(())
        }
    }
}
