//! Request-scoped services.
//!
//! A [`Scope`] is opened for every unit of work (typically one HTTP
//! request). [`ScopedService`]s resolved through it are constructed on first
//! use, shared for the rest of the scope, and released when the scope
//! closes. Singletons stored in the [`App`] are visible from every scope.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::mem::take;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{App, AppBuilder, StdError};

/// How many instances of a capability exist and when they are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance for the whole process, built with the [`App`].
    Singleton,
    /// One instance per [`Scope`], released when the scope closes.
    PerRequest,
}

impl Lifetime {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::PerRequest => "per_request",
        }
    }
}

/// Release contract for objects that hold per-request resources.
pub trait Release {
    fn release(&self);
}

/// Service constructed once per [`Scope`].
///
/// `build` may resolve other capabilities from the same scope, both
/// singletons and request-scoped ones. Whatever it returns is cached by the
/// scope under [`ScopedService::Handle`] and handed to [`ScopedService::release`]
/// exactly once when the scope closes.
pub trait ScopedService: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    fn build(scope: &Scope) -> impl Future<Output = Result<Self::Handle, StdError>> + Send;

    /// Release action run when the owning scope closes. Does nothing unless
    /// overridden.
    fn release(handle: &Self::Handle) {
        let _ = handle;
    }
}

/// Errors returned by [`Scope::resolve`].
#[derive(Debug)]
pub enum ResolveError {
    /// Nothing is bound to the requested capability.
    Unregistered(&'static str),
    /// The capability is already under construction further up the chain.
    /// Holds the chain, ending with the revisited capability.
    Cycle(Vec<&'static str>),
    /// The scope has already been closed.
    Closed(&'static str),
    /// The constructor of a scoped service failed.
    Build {
        service: &'static str,
        source: StdError,
    },
}

impl ResolveError {
    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Unregistered(_) => "configuration",
            ResolveError::Cycle(_) => "cycle",
            ResolveError::Closed(_) => "lifecycle",
            ResolveError::Build { .. } => "build",
        }
    }

    fn from_build(service: &'static str, err: StdError) -> Self {
        // Errors from nested resolutions keep their own class.
        match err.downcast::<ResolveError>() {
            Ok(err) => *err,
            Err(source) => ResolveError::Build { service, source },
        }
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Unregistered(name) => write!(f, "Capability {name} is not registered"),
            ResolveError::Cycle(chain) => {
                write!(f, "Circular dependency: {}", chain.join(" -> "))
            }
            ResolveError::Closed(name) => write!(f, "Cannot resolve {name}: scope is closed"),
            ResolveError::Build { service, source } => {
                write!(f, "Cannot build {service}: {source}")
            }
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Build { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

struct ScopedInstance {
    handle: Box<dyn Any + Send + Sync>,
    release: Box<dyn FnOnce() + Send>,
}

#[async_trait]
trait DynScopedProvider: Send + Sync {
    async fn build(&self, scope: &Scope) -> Result<ScopedInstance, StdError>;

    fn name(&self) -> &'static str;
}

struct ScopedProvider<T>(PhantomData<fn() -> T>);

#[async_trait]
impl<T> DynScopedProvider for ScopedProvider<T>
where
    T: ScopedService + 'static,
{
    async fn build(&self, scope: &Scope) -> Result<ScopedInstance, StdError> {
        let handle = T::build(scope).await?;
        let released = handle.clone();
        Ok(ScopedInstance {
            handle: Box::new(handle),
            release: Box::new(move || T::release(&released)),
        })
    }

    fn name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Providers of every request-scoped capability, keyed by handle type.
#[derive(Default)]
struct ScopedRegistry {
    providers: HashMap<TypeId, Arc<dyn DynScopedProvider>>,
}

impl ScopedRegistry {
    fn add<T>(&mut self)
    where
        T: ScopedService + 'static,
    {
        let type_id = TypeId::of::<T::Handle>();
        if self.providers.contains_key(&type_id) {
            panic!(
                "Scoped service for {} already added",
                type_name::<T::Handle>()
            );
        }
        self.providers
            .insert(type_id, Arc::new(ScopedProvider::<T>(PhantomData)));
    }

    fn has<T>(&self) -> bool
    where
        T: ScopedService + 'static,
    {
        self.providers.contains_key(&TypeId::of::<T::Handle>())
    }

    fn get(&self, type_id: &TypeId) -> Option<Arc<dyn DynScopedProvider>> {
        self.providers.get(type_id).cloned()
    }
}

pub trait AddScopedServiceExt {
    /// Binds `T` to `T::Handle` with the [`Lifetime::PerRequest`] policy.
    ///
    /// # Panics
    ///
    /// Panics if another scoped service is already bound to `T::Handle`.
    fn add_scoped_service<T>(&mut self) -> &mut Self
    where
        T: ScopedService + 'static;

    fn has_scoped_service<T>(&self) -> bool
    where
        T: ScopedService + 'static;
}

impl AddScopedServiceExt for AppBuilder {
    fn add_scoped_service<T>(&mut self) -> &mut Self
    where
        T: ScopedService + 'static,
    {
        match self.get_component_mut::<ScopedRegistry>() {
            Some(registry) => registry.add::<T>(),
            None => {
                let mut registry = ScopedRegistry::default();
                registry.add::<T>();
                self.add_component(registry);
            }
        }
        self
    }

    fn has_scoped_service<T>(&self) -> bool
    where
        T: ScopedService + 'static,
    {
        self.get_component_ref::<ScopedRegistry>()
            .is_some_and(|v| v.has::<T>())
    }
}

impl App {
    /// Reports how the capability `H` is bound, if at all.
    pub fn lifetime<H>(&self) -> Option<Lifetime>
    where
        H: Send + Sync + 'static,
    {
        if self.has_component::<H>() {
            return Some(Lifetime::Singleton);
        }
        self.get_component_ref::<ScopedRegistry>()
            .and_then(|v| v.get(&TypeId::of::<H>()))
            .map(|_| Lifetime::PerRequest)
    }
}

struct PendingRelease {
    service: &'static str,
    action: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct ScopeState {
    closed: bool,
    instances: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    releases: Vec<PendingRelease>,
    chain: Vec<(TypeId, &'static str)>,
}

/// Owner of the request-scoped instances created for one unit of work.
///
/// A scope starts open. [`Scope::close`] releases everything it built, in
/// reverse construction order, and every later [`Scope::resolve`] fails
/// with [`ResolveError::Closed`]. Dropping an open scope closes it, so
/// instances are released on every exit path.
///
/// A scope serves one logical flow: resolutions through it are expected to
/// be sequential, which is what lets the resolution chain detect cycles.
///
/// # Examples
///
/// ```rust
/// use lifespan::{AddScopedServiceExt as _, App, Scope, ScopedService, StdError};
/// use std::sync::Arc;
///
/// struct Counter;
///
/// impl ScopedService for Counter {
///     type Handle = Arc<Self>;
///
///     async fn build(_scope: &Scope) -> Result<Self::Handle, StdError> {
///         Ok(Arc::new(Self))
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = Arc::new(App::builder().add_scoped_service::<Counter>().build().await?);
/// let scope = Scope::new(app);
/// let first = scope.resolve::<Arc<Counter>>().await?;
/// let second = scope.resolve::<Arc<Counter>>().await?;
/// assert!(Arc::ptr_eq(&first, &second));
/// scope.close();
/// assert!(scope.resolve::<Arc<Counter>>().await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct Scope {
    app: Arc<App>,
    state: Mutex<ScopeState>,
}

impl Scope {
    pub fn new(app: Arc<App>) -> Self {
        Self {
            app,
            state: Mutex::new(ScopeState::default()),
        }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Resolves the capability `H`.
    ///
    /// Singletons are returned as stored in the app. Request-scoped handles
    /// are built on first use, cached for the rest of the scope and
    /// registered for release.
    pub async fn resolve<H>(&self) -> Result<H, ResolveError>
    where
        H: Clone + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<H>();
        let name = type_name::<H>();
        let provider = {
            let mut state = self.lock();
            if state.closed {
                return Err(ResolveError::Closed(name));
            }
            if let Some(handle) = self.app.get_component::<H>() {
                return Ok(handle);
            }
            if let Some(handle) = state
                .instances
                .get(&type_id)
                .and_then(|v| v.downcast_ref::<H>())
            {
                return Ok(handle.clone());
            }
            if state.chain.iter().any(|(id, _)| *id == type_id) {
                let mut chain: Vec<_> = state.chain.iter().map(|(_, name)| *name).collect();
                chain.push(name);
                return Err(ResolveError::Cycle(chain));
            }
            let provider = self
                .app
                .get_component_ref::<ScopedRegistry>()
                .and_then(|v| v.get(&type_id))
                .ok_or(ResolveError::Unregistered(name))?;
            state.chain.push((type_id, name));
            provider
        };
        let entry = ChainEntry {
            scope: self,
            type_id,
        };
        let result = provider.build(self).await;
        drop(entry);
        let instance = result.map_err(|err| ResolveError::from_build(provider.name(), err))?;
        let mut state = self.lock();
        if state.closed {
            // Closed while the constructor was running.
            drop(state);
            run_release(provider.name(), instance.release);
            return Err(ResolveError::Closed(name));
        }
        tracing::debug!(service = provider.name(), "Scoped service created");
        state.releases.push(PendingRelease {
            service: provider.name(),
            action: instance.release,
        });
        state
            .instances
            .entry(type_id)
            .or_insert(instance.handle)
            .downcast_ref::<H>()
            .cloned()
            .ok_or(ResolveError::Unregistered(name))
    }

    /// Closes the scope and releases every instance it created.
    ///
    /// Release actions run synchronously in reverse construction order and
    /// have all completed when this returns. A panicking release action is
    /// logged and does not stop the others. Closing an already closed scope
    /// does nothing.
    pub fn close(&self) {
        let (releases, instances) = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (take(&mut state.releases), take(&mut state.instances))
        };
        for release in releases.into_iter().rev() {
            run_release(release.service, release.action);
        }
        drop(instances);
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_release(service: &'static str, action: Box<dyn FnOnce() + Send>) {
    match catch_unwind(AssertUnwindSafe(action)) {
        Ok(()) => tracing::debug!(service, "Scoped service released"),
        Err(_) => tracing::error!(service, "Scoped service release panicked"),
    }
}

/// Entry of the resolution chain, removed on drop so that a cancelled
/// resolve does not leave it behind.
struct ChainEntry<'a> {
    scope: &'a Scope,
    type_id: TypeId,
}

impl Drop for ChainEntry<'_> {
    fn drop(&mut self) {
        self.scope
            .lock()
            .chain
            .retain(|(id, _)| *id != self.type_id);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}
