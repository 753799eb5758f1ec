use std::sync::Arc;

use lifespan::{Release, ScopedService};

use crate::{ApplicationService, RequestUtility};

/// Per-request service built from the shared application service and the
/// request's own utility.
#[derive(ScopedService)]
#[scoped(release)]
pub struct RequestService {
    application_service: Arc<dyn ApplicationService>,
    utility: Arc<dyn RequestUtility>,
}

impl RequestService {
    pub fn application_service(&self) -> &Arc<dyn ApplicationService> {
        &self.application_service
    }

    pub fn utility(&self) -> &Arc<dyn RequestUtility> {
        &self.utility
    }

    /// Names of the implementations behind each field, in declaration
    /// order.
    pub fn exposed_type_names(&self) -> Vec<&'static str> {
        vec![
            self.application_service.type_name(),
            self.utility.type_name(),
        ]
    }
}

impl Release for RequestService {
    fn release(&self) {
        tracing::info!("Request service released");
    }
}
