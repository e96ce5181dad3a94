//! A small service registry standing in for the host framework's dependency
//! injection container.
//!
//! [`ServiceCollection`] accumulates ordered registrations, the built host
//! exposes a [`ServiceProvider`], and every consumer (bootstrap callbacks,
//! service assertions, handlers) resolves through a short-lived
//! [`ServiceScope`]. Scoped instances are cached per scope and released when
//! the scope drops, which gives the acquire/release discipline on every exit
//! path for free.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::FixtureError;

type AnyService = Arc<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn(&ServiceScope) -> AnyService + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifetime {
    Singleton,
    Scoped,
}

struct Registration {
    id: TypeId,
    lifetime: Lifetime,
    construct: Constructor,
}

/// Ordered service registrations for a host under construction.
///
/// The application's startup registers its services first, then the
/// fixture's queued `having_services` callbacks run, so test overrides are
/// appended after the defaults. Resolution walks the registrations in
/// reverse, which makes the last registration for a type win.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: Vec<Registration>,
}

impl ServiceCollection {
    /// Registers an existing instance as a singleton.
    pub fn insert<T: Send + Sync + 'static>(&mut self, instance: T) -> &mut Self {
        let shared = Arc::new(instance);
        self.register::<T>(Lifetime::Singleton, move |_| shared.clone())
    }

    /// Registers a lazily constructed singleton. The constructor runs at
    /// most once, on first resolution, and may resolve other services.
    pub fn singleton<T, F>(&mut self, construct: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceScope) -> T + Send + Sync + 'static,
    {
        self.register::<T>(Lifetime::Singleton, move |scope| Arc::new(construct(scope)))
    }

    /// Registers a scoped service, constructed once per [`ServiceScope`].
    pub fn scoped<T, F>(&mut self, construct: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceScope) -> T + Send + Sync + 'static,
    {
        self.register::<T>(Lifetime::Scoped, move |scope| Arc::new(construct(scope)))
    }

    fn register<T: Send + Sync + 'static>(
        &mut self,
        lifetime: Lifetime,
        construct: impl Fn(&ServiceScope) -> Arc<T> + Send + Sync + 'static,
    ) -> &mut Self {
        self.registrations.push(Registration {
            id: TypeId::of::<T>(),
            lifetime,
            construct: Arc::new(move |scope| {
                let instance: AnyService = construct(scope);
                instance
            }),
        });
        self
    }

    pub(crate) fn into_provider(self) -> ServiceProvider {
        ServiceProvider {
            registrations: Arc::new(self.registrations),
            singletons: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// The root of a built host's service graph. Cheap to clone.
#[derive(Clone)]
pub struct ServiceProvider {
    registrations: Arc<Vec<Registration>>,
    singletons: Arc<Mutex<HashMap<TypeId, AnyService>>>,
}

impl ServiceProvider {
    /// Opens a fresh resolution scope.
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            provider: self.clone(),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// A short-lived resolution scope.
///
/// Clones share the same scoped-instance cache, so a batch of bootstrap
/// callbacks can observe each other's scoped state. Dropping the last clone
/// releases every scoped instance.
#[derive(Clone)]
pub struct ServiceScope {
    provider: ServiceProvider,
    cache: Arc<Mutex<HashMap<TypeId, AnyService>>>,
}

impl ServiceScope {
    /// Resolves a service, failing when the type was never registered.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, FixtureError> {
        self.try_resolve::<T>()
            .ok_or(FixtureError::UnknownService(type_name::<T>()))
    }

    /// Resolves a service, returning `None` when the type was never
    /// registered.
    pub fn try_resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let id = TypeId::of::<T>();
        let registration = self
            .provider
            .registrations
            .iter()
            .rev()
            .find(|r| r.id == id)?;

        let instance = match registration.lifetime {
            Lifetime::Singleton => self.cached(&self.provider.singletons, registration),
            Lifetime::Scoped => self.cached(&self.cache, registration),
        };
        instance.downcast::<T>().ok()
    }

    fn cached(
        &self,
        store: &Arc<Mutex<HashMap<TypeId, AnyService>>>,
        registration: &Registration,
    ) -> AnyService {
        if let Some(hit) = store.lock().unwrap().get(&registration.id) {
            return hit.clone();
        }
        // Construct outside the lock so constructors may resolve their own
        // dependencies through this scope.
        let built = (registration.construct)(self);
        store
            .lock()
            .unwrap()
            .entry(registration.id)
            .or_insert(built)
            .clone()
    }
}
