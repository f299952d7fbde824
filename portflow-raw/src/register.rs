//! Generic register abstractions for type-safe MSR programming

/// A bit field inside a 64-bit register, described by its offset and width
///
/// Fields are packed and unpacked with explicit shifts and masks, so the
/// resulting layout never depends on how a compiler would order bit-fields.
///
/// # Example
///
/// ```
/// use portflow_raw::register::Field;
///
/// const UMASK: Field = Field::new(8, 8);
///
/// let value = UMASK.insert(0, 0x0C);
/// assert_eq!(value, 0x0C00);
/// assert_eq!(UMASK.extract(value), 0x0C);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Bit position of the least significant bit
    pub offset: u32,
    /// Number of bits
    pub width: u32,
}

impl Field {
    pub const fn new(offset: u32, width: u32) -> Self {
        Self { offset, width }
    }

    /// Single-bit flag at `offset`
    pub const fn bit(offset: u32) -> Self {
        Self { offset, width: 1 }
    }

    /// Mask of the field, right-aligned
    pub const fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Read the field out of a raw register value
    pub const fn extract(&self, value: u64) -> u64 {
        (value >> self.offset) & self.mask()
    }

    /// Return `value` with the field replaced by `field_value` (truncated to width)
    pub const fn insert(&self, value: u64, field_value: u64) -> u64 {
        let mask = self.mask() << self.offset;
        (value & !mask) | ((field_value << self.offset) & mask)
    }

    /// Read a single-bit field as a flag
    pub const fn is_set(&self, value: u64) -> bool {
        self.extract(value) != 0
    }

    /// Return `value` with a single-bit field set or cleared
    pub const fn set(&self, value: u64, flag: bool) -> u64 {
        self.insert(value, flag as u64)
    }
}

/// Trait for register layouts that can be converted to/from raw MSR values
///
/// This trait provides type-safe conversion between structured register
/// layouts and the raw 64-bit values that are written to/read from MSRs.
///
/// # Example
///
/// ```
/// use portflow_raw::register::{Field, RegisterLayout};
///
/// #[derive(Debug, Default)]
/// struct MyControl {
///     enable: bool,
///     threshold: u8,
/// }
///
/// const ENABLE: Field = Field::bit(0);
/// const THRESHOLD: Field = Field::new(8, 8);
///
/// impl RegisterLayout for MyControl {
///     fn to_msr_value(&self) -> u64 {
///         let value = ENABLE.set(0, self.enable);
///         THRESHOLD.insert(value, self.threshold as u64)
///     }
///
///     fn from_msr_value(value: u64) -> Self {
///         Self {
///             enable: ENABLE.is_set(value),
///             threshold: THRESHOLD.extract(value) as u8,
///         }
///     }
/// }
///
/// let ctrl = MyControl { enable: true, threshold: 10 };
/// assert_eq!(ctrl.to_msr_value(), 0x0A01);
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this register layout to a raw MSR value
    fn to_msr_value(&self) -> u64;

    /// Parse a raw MSR value into this register layout
    fn from_msr_value(value: u64) -> Self;

    /// Validate that the register values are within acceptable ranges
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// A hardware register with address and typed layout
///
/// Pairs an MSR address with the value that should be written there, so a
/// programming pass can be built up front and applied afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Register<T: RegisterLayout> {
    /// MSR address
    pub address: u64,
    /// Typed register layout
    pub layout: T,
}

impl<T: RegisterLayout> Register<T> {
    /// Create a new register with the given address and layout
    pub fn new(address: u64, layout: T) -> Self {
        Self { address, layout }
    }

    /// Validate the register layout
    pub fn validate(&self) -> Result<(), &'static str> {
        self.layout.validate()
    }

    /// Get the MSR value for this register
    pub fn to_msr_value(&self) -> u64 {
        self.layout.to_msr_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_insert_truncates_to_width() {
        let field = Field::new(4, 4);
        assert_eq!(field.insert(0, 0xFF), 0xF0);
        assert_eq!(field.insert(0xFFFF, 0x0), 0xFF0F);
    }

    #[test]
    fn test_field_extract() {
        let cmask = Field::new(24, 8);
        assert_eq!(cmask.extract(0xAB00_0000), 0xAB);
        assert_eq!(cmask.extract(0x1_AB00_0000), 0xAB);
    }

    #[test]
    fn test_bit_field() {
        let enable = Field::bit(22);
        let value = enable.set(0, true);
        assert_eq!(value, 1 << 22);
        assert!(enable.is_set(value));
        assert!(!enable.is_set(enable.set(value, false)));
    }

    #[test]
    fn test_full_width_field() {
        let all = Field::new(0, 64);
        assert_eq!(all.mask(), u64::MAX);
        assert_eq!(all.extract(u64::MAX), u64::MAX);
    }
}
