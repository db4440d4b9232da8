use derive_builder::Builder;

use crate::validate::DEFAULT_FIRING_CAP_FACTOR;

#[derive(Builder, Clone, Debug)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct WorkspaceConfig {
    /// Firings allowed per element during the soundness simulation.
    #[builder(default = "DEFAULT_FIRING_CAP_FACTOR")]
    pub firing_cap_factor: usize,
    /// Queued validation requests before edits wait for the worker.
    #[builder(default = "128")]
    pub request_capacity: usize,
    /// Buffered workspace events per subscriber.
    #[builder(default = "128")]
    pub event_capacity: usize,
    /// Undo snapshots kept per net.
    #[builder(default = "50")]
    pub history_depth: usize,
}

impl WorkspaceConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.request_capacity == Some(0) {
            return Err("request_capacity must be greater than zero".into());
        }
        if self.event_capacity == Some(0) {
            return Err("event_capacity must be greater than zero".into());
        }
        Ok(())
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            firing_cap_factor: DEFAULT_FIRING_CAP_FACTOR,
            request_capacity: 128,
            event_capacity: 128,
            history_depth: 50,
        }
    }
}
