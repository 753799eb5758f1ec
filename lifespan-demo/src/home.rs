use std::sync::Arc;

use lifespan::{App, AppBuilder, Lifetime, Service, StdError};
use lifespan_http::{Json, Router, RouterBuilder, Scoped, routing};

use crate::{ApplicationService, RequestService, RequestUtility};

/// Serves `GET /` with the implementation names exposed by the request's
/// [`RequestService`].
pub struct HomeRouter;

impl Service for HomeRouter {
    type Handle = Arc<Self>;

    async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
        Ok(Arc::new(Self))
    }
}

impl RouterBuilder for HomeRouter {
    fn build_router(self: Arc<Self>, app: &App) -> Router {
        tracing::info!(
            application_service = lifetime_name(app.lifetime::<Arc<dyn ApplicationService>>()),
            request_utility = lifetime_name(app.lifetime::<Arc<dyn RequestUtility>>()),
            request_service = lifetime_name(app.lifetime::<Arc<RequestService>>()),
            "Home router bindings"
        );
        Router::new().route("/", routing::get(home))
    }
}

fn lifetime_name(lifetime: Option<Lifetime>) -> &'static str {
    lifetime.map_or("unbound", Lifetime::as_str)
}

async fn home(Scoped(service): Scoped<Arc<RequestService>>) -> Json<Vec<&'static str>> {
    Json(service.exposed_type_names())
}
