// Port utilization arithmetic on raw counter readings

/// Events counted between two readings of a counter that implements the
/// bits in `counter_mask`
///
/// The subtraction wraps modulo the counter width, so a counter that
/// overflowed once between readings still yields the right delta.
pub fn counter_delta(previous: u64, current: u64, counter_mask: u64) -> u64 {
    current.wrapping_sub(previous) & counter_mask
}

/// Percentage of `elapsed_cycles` in which the event fired
///
/// Not clamped: readings taken slightly after the timestamp can exceed 100.
pub fn utilization(delta: u64, elapsed_cycles: u64) -> f64 {
    delta as f64 / elapsed_cycles as f64 * 100.0
}
