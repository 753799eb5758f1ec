use std::any::{Any, TypeId, type_name};
use std::collections::{HashMap, HashSet, hash_map};
use std::mem::take;

use async_trait::async_trait;

use crate::StdError;

/// Process-wide container.
///
/// An `App` owns every singleton handle built during [`AppBuilder::build`]
/// together with the registry of request-scoped providers. It is immutable
/// once built and is meant to be shared as `Arc<App>` by every request.
///
/// # Examples
///
/// ```rust
/// use lifespan::{App, AddServiceExt as _, AppBuilder, Service, StdError};
/// use std::sync::Arc;
///
/// struct Clock;
///
/// impl Service for Clock {
///     type Handle = Arc<Self>;
///
///     async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
///         Ok(Arc::new(Self))
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = App::builder().add_service::<Clock>().build().await?;
/// assert!(app.has_component::<Arc<Clock>>());
/// # Ok(())
/// # }
/// ```
pub struct App {
    components: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

/// Errors reported while building an [`App`].
#[derive(Debug)]
pub enum AppError {
    /// Plugins or services depend on each other in a loop.
    CircularDependency,
    /// A declared dependency was never registered.
    MissingDependency,
    /// A plugin or singleton constructor failed.
    PluginError(StdError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::CircularDependency => write!(f, "Circular dependency detected"),
            AppError::MissingDependency => write!(f, "Missing dependency"),
            AppError::PluginError(e) => write!(f, "Plugin error: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::PluginError(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<StdError> for AppError {
    fn from(value: StdError) -> Self {
        Self::PluginError(value)
    }
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder {
            components: HashMap::new(),
            plugins: HashMap::new(),
            pending_plugins: Vec::new(),
        }
    }

    /// Returns a clone of the component stored under type `T`.
    ///
    /// Singleton services are stored under their handle type, so
    /// `get_component::<Arc<dyn Capability>>()` returns the one shared
    /// instance bound to that capability.
    pub fn get_component<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get_component_ref().cloned()
    }

    pub fn has_component<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.components.contains_key(&TypeId::of::<T>())
    }

    pub fn get_component_ref<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }
}

/// Registration phase of an [`App`].
///
/// Plugins, singleton services and request-scoped services are registered
/// here. Nothing is constructed until [`AppBuilder::build`] runs, which
/// orders plugins by their declared [`Dependencies`] and builds each of them
/// exactly once.
pub struct AppBuilder {
    components: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    plugins: HashMap<TypeId, Box<dyn DynPlugin>>,
    pending_plugins: Vec<TypeId>,
}

impl AppBuilder {
    /// Registers a plugin.
    ///
    /// # Panics
    ///
    /// Panics if a plugin of the same type has already been added.
    pub fn add_plugin<T>(&mut self, plugin: T) -> &mut Self
    where
        T: Plugin + 'static,
    {
        let type_id = TypeId::of::<T>();
        match self.plugins.entry(type_id) {
            hash_map::Entry::Occupied(_) => panic!("Plugin {} already added", type_name::<T>()),
            hash_map::Entry::Vacant(v) => {
                v.insert(Box::new(plugin));
                self.pending_plugins.push(type_id);
            }
        };
        self
    }

    pub fn has_plugin<T>(&self) -> bool
    where
        T: Plugin + 'static,
    {
        self.plugins.contains_key(&TypeId::of::<T>())
    }

    /// Stores a ready-made component.
    ///
    /// Each type can be stored once, which is what keeps a capability bound
    /// to exactly one implementation.
    ///
    /// # Panics
    ///
    /// Panics if a component of the same type has already been added.
    pub fn add_component<T>(&mut self, component: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        match self.components.entry(TypeId::of::<T>()) {
            hash_map::Entry::Occupied(_) => panic!("Component {} already added", type_name::<T>()),
            hash_map::Entry::Vacant(v) => {
                v.insert(Box::new(component));
            }
        };
        self
    }

    pub fn get_component<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get_component_ref().cloned()
    }

    pub fn has_component<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.components.contains_key(&TypeId::of::<T>())
    }

    pub fn get_component_ref<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_component_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.components
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Builds every pending plugin in dependency order and freezes the
    /// container.
    ///
    /// Plugins may register further plugins while they build; those are
    /// picked up by the next round. A round that cannot make progress means
    /// some dependency was never registered.
    pub async fn build(&mut self) -> Result<App, AppError> {
        let mut graph = HashMap::new();
        let mut used = HashMap::new();
        while !self.pending_plugins.is_empty() {
            let pending_plugins = take(&mut self.pending_plugins);
            for type_id in &pending_plugins {
                if let Some(plugin) = self.plugins.get(type_id) {
                    graph.insert(*type_id, plugin.dependencies().plugins);
                }
            }
            let mut order = Vec::new();
            for type_id in pending_plugins {
                if used.contains_key(&type_id)
                    || topological_sort(type_id, &graph, &mut order, &mut used)?
                {
                    continue;
                }
                self.pending_plugins.push(type_id);
            }
            if order.is_empty() {
                return Err(AppError::MissingDependency);
            }
            for type_id in order {
                // The plugin is taken out of the map while it builds, so it
                // can mutate the builder freely.
                let Some(plugin) = self.plugins.remove(&type_id) else {
                    continue;
                };
                let result = plugin.build(self).await;
                self.plugins.insert(type_id, plugin);
                result.map_err(AppError::PluginError)?;
            }
        }
        take(&mut self.plugins);
        Ok(App {
            components: take(&mut self.components),
        })
    }
}

enum DependencyStatus {
    Pending,
    Ready,
}

fn topological_sort(
    type_id: TypeId,
    graph: &HashMap<TypeId, HashSet<TypeId>>,
    order: &mut Vec<TypeId>,
    used: &mut HashMap<TypeId, DependencyStatus>,
) -> Result<bool, AppError> {
    let dependencies = match graph.get(&type_id) {
        Some(v) => v,
        None => return Ok(false),
    };
    used.insert(type_id, DependencyStatus::Pending);
    for dep_type_id in dependencies {
        match used.get(dep_type_id) {
            Some(DependencyStatus::Pending) => return Err(AppError::CircularDependency),
            Some(DependencyStatus::Ready) => continue,
            None => {}
        }
        if !topological_sort(*dep_type_id, graph, order, used)? {
            used.remove(&type_id);
            return Ok(false);
        }
    }
    used.insert(type_id, DependencyStatus::Ready);
    order.push(type_id);
    Ok(true)
}

/// Set of plugins that must be built before the one declaring it.
#[derive(Clone, Default)]
pub struct Dependencies {
    plugins: HashSet<TypeId>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin<T>(mut self) -> Self
    where
        T: Plugin + 'static,
    {
        self.plugins.insert(TypeId::of::<T>());
        self
    }

    pub fn merge(mut self, other: Dependencies) -> Self {
        self.plugins.extend(other.plugins);
        self
    }
}

/// Unit of application setup.
///
/// Singleton services, routers and daemons are all registered through
/// plugins; `build` runs once, after every plugin in
/// [`Plugin::dependencies`] has been built.
pub trait Plugin: Send + Sync {
    fn build(&self, app: &mut AppBuilder) -> impl Future<Output = Result<(), StdError>> + Send;

    fn dependencies(&self) -> Dependencies {
        Dependencies::new()
    }
}

#[async_trait]
trait DynPlugin: Send + Sync {
    async fn build(&self, app: &mut AppBuilder) -> Result<(), StdError>;

    fn dependencies(&self) -> Dependencies;
}

#[async_trait]
impl<T> DynPlugin for T
where
    T: Plugin,
{
    async fn build(&self, app: &mut AppBuilder) -> Result<(), StdError> {
        T::build(self, app).await
    }

    fn dependencies(&self) -> Dependencies {
        T::dependencies(self)
    }
}
