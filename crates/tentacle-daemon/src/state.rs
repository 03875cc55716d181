use std::sync::Arc;

use tentacle_core::fleet::FleetController;

use crate::event_bus::EventBus;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetController>,
    pub events: EventBus,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(fleet: Arc<FleetController>, events: EventBus) -> Self {
        Self {
            fleet,
            events,
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("reqwest client"),
        }
    }
}
