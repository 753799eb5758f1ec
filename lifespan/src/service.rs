use std::marker::PhantomData;

use crate::{AppBuilder, Dependencies, Plugin};

/// Boxed error that can cross threads and `.await` points.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Process-lifetime service.
///
/// A `Service` is constructed once while the [`App`](crate::App) is being
/// built and its [`Handle`](Service::Handle) is stored as a component. The
/// handle type is the capability other code asks for, so binding an
/// implementation to an interface means picking a trait-object handle:
///
/// ```rust
/// use lifespan::{App, AddServiceExt as _, AppBuilder, Service, StdError};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> &'static str;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> &'static str {
///         "hello"
///     }
/// }
///
/// impl Service for English {
///     type Handle = Arc<dyn Greeter>;
///
///     async fn build(_app: &AppBuilder) -> Result<Self::Handle, StdError> {
///         Ok(Arc::new(English))
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = App::builder().add_service::<English>().build().await?;
/// let greeter = app.get_component::<Arc<dyn Greeter>>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// # Ok(())
/// # }
/// ```
pub trait Service: Send + Sync {
    type Handle: Send + Sync + 'static;

    /// Builds the service. Singletons it depends on are already stored in
    /// `app` when this runs, provided they are listed in
    /// [`Service::dependencies`].
    fn build(app: &AppBuilder) -> impl Future<Output = Result<Self::Handle, StdError>> + Send;

    fn dependencies() -> Dependencies {
        Dependencies::new()
    }
}

struct ServiceProvider<T>(PhantomData<fn() -> T>)
where
    T: Service;

impl<T> Plugin for ServiceProvider<T>
where
    T: Service,
{
    async fn build(&self, app: &mut AppBuilder) -> Result<(), StdError> {
        let handle = T::build(app).await?;
        app.add_component(handle);
        Ok(())
    }

    fn dependencies(&self) -> Dependencies {
        T::dependencies()
    }
}

pub trait AddServiceExt {
    /// Registers `T` as the singleton bound to `T::Handle`.
    fn add_service<T>(&mut self) -> &mut Self
    where
        T: Service + 'static;

    fn has_service<T>(&self) -> bool
    where
        T: Service + 'static;
}

impl AddServiceExt for AppBuilder {
    fn add_service<T>(&mut self) -> &mut Self
    where
        T: Service + 'static,
    {
        self.add_plugin(ServiceProvider::<T>(PhantomData));
        self
    }

    fn has_service<T>(&self) -> bool
    where
        T: Service + 'static,
    {
        self.has_plugin::<ServiceProvider<T>>()
    }
}

pub trait ServiceDependencyExt {
    fn service<T>(self) -> Self
    where
        T: Service + 'static;
}

impl ServiceDependencyExt for Dependencies {
    fn service<T>(self) -> Self
    where
        T: Service + 'static,
    {
        self.plugin::<ServiceProvider<T>>()
    }
}
