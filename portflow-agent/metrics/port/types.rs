// Execution-port utilization metrics
use crate::metric_enum;

metric_enum! {
    pub enum PortMetric {
        Port0 => "Port0Utilization",
        Port1 => "Port1Utilization",
        Port2 => "Port2Utilization",
        Port3 => "Port3Utilization",
        Port4 => "Port4Utilization",
        Port5 => "Port5Utilization",
    }
}
