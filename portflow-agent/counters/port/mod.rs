pub mod events;
pub mod monitor;

pub use events::{PortEvent, SlotAssignment, UOPS_DISPATCHED_PORT};
pub use monitor::{CoreSample, CoreState, PortMonitor};
