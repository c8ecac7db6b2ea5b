use crate::scheduler::Monitor;

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub monitor: Monitor,
}

impl AppState {
    pub fn new(monitor: Monitor) -> Self {
        Self { monitor }
    }
}
