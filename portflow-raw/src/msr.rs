//! MSR (Model-Specific Register) device handle
//!
//! This module provides low-level MSR access through `/dev/cpu/*/msr`.
//! Each [`MsrDevice`] owns exactly one open device file for one logical CPU
//! and closes it when dropped or explicitly closed.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, MsrError>;

/// Size of a single MSR transfer in bytes
pub const MSR_WIDTH: usize = 8;

/// Errors that can occur during MSR operations
#[derive(Debug, thiserror::Error)]
pub enum MsrError {
    #[error("Failed to open MSR device for CPU {cpu}: {source}")]
    OpenFailed { cpu: u32, source: std::io::Error },

    #[error("Failed to read MSR 0x{msr:X} on CPU {cpu}: {source}")]
    ReadFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to write MSR 0x{msr:X} on CPU {cpu}: {source}")]
    WriteFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Short read of MSR 0x{msr:X} on CPU {cpu}: {len} of 8 bytes")]
    ShortRead { cpu: u32, msr: u64, len: usize },

    #[error("Short write of MSR 0x{msr:X} on CPU {cpu}: {len} of 8 bytes")]
    ShortWrite { cpu: u32, msr: u64, len: usize },
}

/// Path of the MSR device file for a logical CPU
pub fn device_path(cpu: u32) -> PathBuf {
    PathBuf::from(format!("/dev/cpu/{cpu}/msr"))
}

/// Exclusive handle to one logical CPU's MSR device
///
/// The handle is move-only: it cannot be cloned, and moving it into another
/// owner leaves nothing behind to close twice. The file is released exactly
/// once, either by [`MsrDevice::close`] or on drop.
///
/// Transfers are positional (`pread`/`pwrite` at the register address), so
/// no seek state is shared between reads and writes.
#[derive(Debug)]
pub struct MsrDevice {
    file: File,
    cpu: u32,
}

impl MsrDevice {
    /// Open the MSR device of `cpu` for reading and writing
    ///
    /// # Errors
    ///
    /// Returns [`MsrError::OpenFailed`] if the device does not exist (the
    /// `msr` kernel module is not loaded) or the process lacks
    /// root/CAP_SYS_RAWIO.
    pub fn open(cpu: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device_path(cpu))
            .map_err(|source| MsrError::OpenFailed { cpu, source })?;

        Ok(Self { file, cpu })
    }

    /// Logical CPU this handle belongs to
    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Read a 64-bit value from an MSR
    ///
    /// Anything other than a full 8-byte transfer is an error.
    pub fn read(&self, msr: u64) -> Result<u64> {
        let mut buffer = [0u8; MSR_WIDTH];
        let len = self
            .file
            .read_at(&mut buffer, msr)
            .map_err(|source| MsrError::ReadFailed {
                cpu: self.cpu,
                msr,
                source,
            })?;

        if len != MSR_WIDTH {
            return Err(MsrError::ShortRead {
                cpu: self.cpu,
                msr,
                len,
            });
        }

        Ok(u64::from_ne_bytes(buffer))
    }

    /// Write a 64-bit value to an MSR
    ///
    /// # Safety
    ///
    /// Writing incorrect values to MSRs can cause system instability or crashes.
    /// Validate register values with `RegisterLayout::validate()` before writing.
    pub fn write(&mut self, msr: u64, value: u64) -> Result<()> {
        let len = self
            .file
            .write_at(&value.to_ne_bytes(), msr)
            .map_err(|source| MsrError::WriteFailed {
                cpu: self.cpu,
                msr,
                source,
            })?;

        if len != MSR_WIDTH {
            return Err(MsrError::ShortWrite {
                cpu: self.cpu,
                msr,
                len,
            });
        }

        Ok(())
    }

    /// Release the device file now instead of at end of scope
    pub fn close(self) {
        drop(self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msr_error_display() {
        let err = MsrError::OpenFailed {
            cpu: 0,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("Failed to open MSR device"));
    }

    #[test]
    fn test_short_transfer_display() {
        let err = MsrError::ShortRead {
            cpu: 3,
            msr: 0xC1,
            len: 4,
        };
        assert_eq!(err.to_string(), "Short read of MSR 0xC1 on CPU 3: 4 of 8 bytes");
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(7), PathBuf::from("/dev/cpu/7/msr"));
    }

    /// Handle over a regular file standing in for the device
    fn scratch_device(contents: &[u8]) -> MsrDevice {
        let file = tempfile::tempfile().unwrap();
        file.write_all_at(contents, 0).unwrap();
        MsrDevice { file, cpu: 0 }
    }

    #[test]
    fn test_short_read_is_error() {
        let device = scratch_device(&[0xA1, 0x01, 0x63, 0x00]);
        let err = device.read(0).unwrap_err();
        assert!(matches!(err, MsrError::ShortRead { cpu: 0, msr: 0, len: 4 }));

        let err = device.read(0x186).unwrap_err();
        assert!(matches!(err, MsrError::ShortRead { len: 0, .. }));
        device.close();
    }

    #[test]
    fn test_full_transfer_round_trips() {
        let mut device = scratch_device(&[]);
        device.write(0xC1, 0x0000_1234_5678_9ABC).unwrap();
        assert_eq!(device.read(0xC1).unwrap(), 0x0000_1234_5678_9ABC);
        assert_eq!(device.cpu(), 0);
        device.close();
    }

    #[test]
    fn test_open_missing_cpu_fails() {
        let err = MsrDevice::open(u32::MAX).unwrap_err();
        assert!(matches!(err, MsrError::OpenFailed { cpu: u32::MAX, .. }));
    }
}
