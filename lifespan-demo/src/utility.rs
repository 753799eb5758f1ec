use std::sync::Arc;

use lifespan::{Release, Scope, ScopedService, StdError};

/// Helper owned by a single request and released when it ends.
pub trait RequestUtility: Release + Send + Sync {
    fn type_name(&self) -> &'static str;
}

pub struct RequestUtilityOne;

impl RequestUtility for RequestUtilityOne {
    fn type_name(&self) -> &'static str {
        "RequestUtilityOne"
    }
}

impl Release for RequestUtilityOne {
    fn release(&self) {
        tracing::info!(utility = "RequestUtilityOne", "Request utility released");
    }
}

impl ScopedService for RequestUtilityOne {
    type Handle = Arc<dyn RequestUtility>;

    async fn build(_scope: &Scope) -> Result<Self::Handle, StdError> {
        tracing::info!(utility = "RequestUtilityOne", "Request utility created");
        Ok(Arc::new(Self))
    }

    fn release(handle: &Self::Handle) {
        Release::release(&**handle);
    }
}

pub struct RequestUtilityTwo;

impl RequestUtility for RequestUtilityTwo {
    fn type_name(&self) -> &'static str {
        "RequestUtilityTwo"
    }
}

impl Release for RequestUtilityTwo {
    fn release(&self) {
        tracing::info!(utility = "RequestUtilityTwo", "Request utility released");
    }
}

impl ScopedService for RequestUtilityTwo {
    type Handle = Arc<dyn RequestUtility>;

    async fn build(_scope: &Scope) -> Result<Self::Handle, StdError> {
        tracing::info!(utility = "RequestUtilityTwo", "Request utility created");
        Ok(Arc::new(Self))
    }

    fn release(handle: &Self::Handle) {
        Release::release(&**handle);
    }
}
