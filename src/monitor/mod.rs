mod orchestrator;
mod processing;
mod state;
#[cfg(test)]
mod tests;

pub use orchestrator::{
    ControlResponse, CrowdMonitor, CrowdMonitorBuilder, NOT_MONITORING_MESSAGE, STARTED_MESSAGE,
    STOPPED_MESSAGE,
};
pub use state::{LoopMetrics, LoopMetricsSnapshot, ModeCell, RunMode};
