use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lifespan::{App, AppBuilder, StdError};
use tokio::task::JoinSet;

pub use tokio_util::sync::CancellationToken;

use crate::defer;

/// Long-running background task started by [`RunDaemonsExt::run_daemons`].
///
/// Daemons get the shared app so that per-request work can open its own
/// [`Scope`](lifespan::Scope) over it. A daemon should return once
/// `shutdown` is cancelled.
pub trait Daemon: Send + Sync {
    fn run(
        &self,
        app: Arc<App>,
        shutdown: CancellationToken,
    ) -> impl Future<Output = Result<(), StdError>> + Send;
}

#[async_trait]
trait DynDaemon: Send + Sync {
    async fn run(&self, app: Arc<App>, shutdown: CancellationToken) -> Result<(), StdError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T> DynDaemon for T
where
    T: Daemon,
{
    async fn run(&self, app: Arc<App>, shutdown: CancellationToken) -> Result<(), StdError> {
        Daemon::run(self, app, shutdown).await
    }

    fn name(&self) -> &'static str {
        type_name::<T>()
    }
}

#[derive(Default)]
struct DaemonRegistry {
    daemons: HashMap<TypeId, Arc<dyn DynDaemon>>,
}

impl DaemonRegistry {
    fn add_daemon<T>(&mut self, daemon: Arc<T>)
    where
        T: Daemon + 'static,
    {
        self.daemons.insert(TypeId::of::<T>(), daemon);
    }

    fn has_daemon<T>(&self) -> bool
    where
        T: Daemon + 'static,
    {
        self.daemons.contains_key(&TypeId::of::<T>())
    }

    async fn run_daemons(&self, app: Arc<App>, shutdown: CancellationToken) -> Result<(), StdError> {
        let span = tracing::info_span!("daemons", count = self.daemons.len());
        let mut futures = JoinSet::new();
        for daemon in self.daemons.values() {
            let shutdown = shutdown.child_token();
            let app = app.clone();
            let daemon = daemon.clone();
            futures.spawn(async move {
                let result = daemon.run(app, shutdown).await;
                (daemon.name(), result)
            });
        }
        tracing::info!(parent: &span, "Daemons running");
        defer! {
            tracing::info!(parent: &span, "Daemons stopped");
        };
        // The first daemon to exit stops all the others.
        let mut first_error = None;
        while let Some(joined) = futures.join_next().await {
            shutdown.cancel();
            let (name, result) = joined?;
            if let Err(err) = result {
                tracing::error!(parent: &span, daemon = name, error = %err, "Daemon failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub trait RunDaemonsExt {
    fn run_daemons(
        self,
        shutdown: CancellationToken,
    ) -> impl Future<Output = Result<(), StdError>> + Send;
}

impl RunDaemonsExt for App {
    async fn run_daemons(self, shutdown: CancellationToken) -> Result<(), StdError> {
        Arc::new(self).run_daemons(shutdown).await
    }
}

impl RunDaemonsExt for Arc<App> {
    async fn run_daemons(self, shutdown: CancellationToken) -> Result<(), StdError> {
        match self.get_component_ref::<DaemonRegistry>() {
            Some(v) => v.run_daemons(self.clone(), shutdown).await,
            None => Ok(()),
        }
    }
}

pub trait AddDaemonExt {
    fn add_daemon<T>(&mut self, daemon: impl Into<Arc<T>>) -> &mut Self
    where
        T: Daemon + 'static;

    fn has_daemon<T>(&self) -> bool
    where
        T: Daemon + 'static;
}

impl AddDaemonExt for AppBuilder {
    fn add_daemon<T>(&mut self, daemon: impl Into<Arc<T>>) -> &mut Self
    where
        T: Daemon + 'static,
    {
        match self.get_component_mut::<DaemonRegistry>() {
            Some(registry) => registry.add_daemon(daemon.into()),
            None => {
                let mut registry = DaemonRegistry::default();
                registry.add_daemon(daemon.into());
                self.add_component(registry);
            }
        }
        self
    }

    fn has_daemon<T>(&self) -> bool
    where
        T: Daemon + 'static,
    {
        self.get_component_ref::<DaemonRegistry>()
            .is_some_and(|v| v.has_daemon::<T>())
    }
}
