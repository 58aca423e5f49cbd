use crate::turn::TurnController;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single turn controller of this process
    pub controller: Arc<TurnController>,
}

impl AppState {
    pub fn new(controller: TurnController) -> Self {
        Self {
            controller: Arc::new(controller),
        }
    }
}
