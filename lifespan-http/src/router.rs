use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use lifespan::{
    AddServiceExt as _, App, AppBuilder, Dependencies, Plugin, Service, ServiceDependencyExt as _,
    StdError,
};
use lifespan_base::{AddDaemonExt as _, CancellationToken, Config, ConfigSection, Daemon, defer};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;

use crate::RequestScopeLayer;
use crate::scope::panic_response;
use crate::trace::TracingLayer;

#[derive(Default)]
struct RouterRegistry {
    routers: Vec<Arc<dyn DynRouterBuilder>>,
}

impl RouterRegistry {
    fn add_router<T: RouterBuilder + 'static>(&mut self, router: Arc<T>) {
        self.routers.push(router);
    }

    fn build_router(&self, app: &App) -> Router {
        self.routers.iter().fold(Router::new(), |acc, v| {
            acc.merge(v.clone().build_router(app))
        })
    }
}

struct ServerDaemon {
    addr: SocketAddr,
}

impl Daemon for ServerDaemon {
    async fn run(&self, app: Arc<App>, shutdown: CancellationToken) -> Result<(), StdError> {
        let span = tracing::info_span!("http_server", addr = ?self.addr);
        let router = app
            .get_component_ref::<RouterRegistry>()
            .ok_or("Router registry is missing")?
            .build_router(&app)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(RequestScopeLayer::new(app.clone()))
            .layer(TracingLayer);
        tracing::info!(parent: &span, "Server starting");
        defer! {
            tracing::info!(parent: &span, "Server stopped")
        };
        let listener = TcpListener::bind(self.addr).await.map_err(Box::new)?;
        tracing::info!(parent: &span, "Server started");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(Box::new)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpServerConfig {
    pub addr: SocketAddr,
}

impl ConfigSection for HttpServerConfig {
    fn key() -> &'static str {
        "http_server"
    }
}

/// Serves every router added with [`AddRouterExt::add_router`] on the
/// address from the `http_server` config section.
pub struct HttpServerPlugin;

impl Plugin for HttpServerPlugin {
    async fn build(&self, app: &mut AppBuilder) -> Result<(), StdError> {
        app.add_component(RouterRegistry::default());
        let config = app
            .get_component_ref::<Config>()
            .ok_or("Config component is missing")?
            .get::<HttpServerConfig>(HttpServerConfig::key())?;
        app.add_daemon(ServerDaemon { addr: config.addr });
        Ok(())
    }
}

pub trait RouterBuilder: Send + Sync {
    fn build_router(self: Arc<Self>, app: &App) -> Router;
}

trait DynRouterBuilder: Send + Sync {
    fn build_router(self: Arc<Self>, app: &App) -> Router;
}

impl<T> DynRouterBuilder for T
where
    T: RouterBuilder,
{
    fn build_router(self: Arc<Self>, app: &App) -> Router {
        RouterBuilder::build_router(self, app)
    }
}

struct RouterProvider<T>(PhantomData<fn() -> T>);

impl<T> Plugin for RouterProvider<T>
where
    T: Service<Handle = Arc<T>> + RouterBuilder + 'static,
{
    async fn build(&self, app: &mut AppBuilder) -> Result<(), StdError> {
        let router = app
            .get_component::<T::Handle>()
            .ok_or("Router service is missing")?;
        app.get_component_mut::<RouterRegistry>()
            .ok_or("Router registry is missing")?
            .add_router(router);
        Ok(())
    }

    fn dependencies(&self) -> Dependencies {
        T::dependencies()
            .service::<T>()
            .plugin::<HttpServerPlugin>()
    }
}

pub trait AddRouterExt {
    fn add_router<T>(&mut self) -> &mut Self
    where
        T: Service<Handle = Arc<T>> + RouterBuilder + 'static;

    fn has_router<T>(&self) -> bool
    where
        T: Service<Handle = Arc<T>> + RouterBuilder + 'static;
}

impl AddRouterExt for AppBuilder {
    fn add_router<T>(&mut self) -> &mut Self
    where
        T: Service<Handle = Arc<T>> + RouterBuilder + 'static,
    {
        if !self.has_service::<T>() {
            self.add_service::<T>();
        }
        self.add_plugin(RouterProvider::<T>(PhantomData));
        self
    }

    fn has_router<T>(&self) -> bool
    where
        T: Service<Handle = Arc<T>> + RouterBuilder + 'static,
    {
        self.has_plugin::<RouterProvider<T>>()
    }
}
