use std::sync::Arc;

use lifespan::{AppBuilder, Service, StdError};

/// Process-wide service shared by every request.
pub trait ApplicationService: Send + Sync {
    fn type_name(&self) -> &'static str;
}

pub struct ApplicationServiceOne;

impl ApplicationService for ApplicationServiceOne {
    fn type_name(&self) -> &'static str {
        "ApplicationServiceOne"
    }
}

impl Service for ApplicationServiceOne {
    type Handle = Arc<dyn ApplicationService>;

    async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
        tracing::info!(service = "ApplicationServiceOne", "Application service created");
        Ok(Arc::new(Self))
    }
}

pub struct ApplicationServiceTwo;

impl ApplicationService for ApplicationServiceTwo {
    fn type_name(&self) -> &'static str {
        "ApplicationServiceTwo"
    }
}

impl Service for ApplicationServiceTwo {
    type Handle = Arc<dyn ApplicationService>;

    async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
        tracing::info!(service = "ApplicationServiceTwo", "Application service created");
        Ok(Arc::new(Self))
    }
}
