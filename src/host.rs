//! The in-memory host: the application under test plus everything the
//! fixture wired into it.

use std::sync::Arc;

use axum::{Extension, Router};

use crate::client::{self, ClientOptions};
use crate::config::{AppConfig, AppConfigBuilder};
use crate::error::FixtureError;
use crate::logging::{LogChannel, LoggingBuilder, TestOutput};
use crate::request::RequestSpec;
use crate::response::ResponseSnapshot;
use crate::services::{ServiceCollection, ServiceProvider};

pub(crate) type ConfigAction = Box<dyn FnOnce(&mut AppConfigBuilder) + Send>;
pub(crate) type ServiceAction = Box<dyn FnOnce(&mut ServiceCollection) + Send>;
pub(crate) type ClientAction = Box<dyn FnOnce(&mut ClientOptions) + Send>;
pub(crate) type LoggingAction = Box<dyn FnOnce(&mut LoggingBuilder) + Send>;

/// The application definition the fixture boots.
///
/// Implementations describe how the application assembles itself from
/// configuration and services; the fixture supplies both, with test
/// overrides already applied.
pub trait Startup: Send + Sync + 'static {
    /// Seeds configuration defaults. Fixture overrides run afterwards and
    /// win on conflicting keys.
    fn configure_defaults(&self, config: &mut AppConfigBuilder) {
        let _ = config;
    }

    /// Registers the application's services. Fixture overrides are appended
    /// afterwards and shadow earlier registrations of the same type.
    fn configure_services(&self, config: &AppConfig, services: &mut ServiceCollection) {
        let _ = (config, services);
    }

    /// Builds the application router. A panic here is a host construction
    /// failure: it propagates synchronously and is never aggregated.
    fn build_router(&self, config: &AppConfig, services: &ServiceProvider) -> Router;
}

/// A built test host: frozen configuration, the service provider, the
/// router, the client options, and the log channel.
///
/// Owned by the fixture that built it and shared read-only with chained
/// child fixtures.
pub struct Host {
    environment: String,
    config: AppConfig,
    services: ServiceProvider,
    client_options: ClientOptions,
    router: Router,
    log: LogChannel,
}

impl Host {
    pub(crate) fn build(
        startup: &dyn Startup,
        environment: String,
        config_actions: Vec<ConfigAction>,
        logging_actions: Vec<LoggingAction>,
        service_actions: Vec<ServiceAction>,
        client_actions: Vec<ClientAction>,
        output: TestOutput,
    ) -> Self {
        let mut config_builder = AppConfigBuilder::default();
        startup.configure_defaults(&mut config_builder);
        for action in config_actions {
            action(&mut config_builder);
        }
        let config = config_builder.freeze(environment.clone());

        let mut logging = LoggingBuilder::default();
        for action in logging_actions {
            action(&mut logging);
        }
        let log = LogChannel::new(output, &logging);

        let mut services = ServiceCollection::default();
        startup.configure_services(&config, &mut services);
        for action in service_actions {
            action(&mut services);
        }
        let services = services.into_provider();

        let mut client_options = ClientOptions::default();
        for action in client_actions {
            action(&mut client_options);
        }

        let router = tracing::dispatcher::with_default(log.dispatch(), || {
            tracing::info!(environment = %environment, "bootstrapping test host");
            startup.build_router(&config, &services)
        });
        let router = router
            .layer(Extension(config.clone()))
            .layer(Extension(services.clone()));

        Self {
            environment,
            config,
            services,
            client_options,
            router,
            log,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    pub fn client_options(&self) -> &ClientOptions {
        &self.client_options
    }

    pub(crate) fn log(&self) -> &LogChannel {
        &self.log
    }

    pub(crate) async fn send(&self, spec: &RequestSpec) -> Result<ResponseSnapshot, FixtureError> {
        client::send(&self.router, &self.client_options, spec).await
    }
}

/// How a fixture relates to its host: the owning fixture builds it exactly
/// once, a chained child borrows the parent's host and never rebuilds or
/// re-applies configuration.
pub(crate) enum HostBinding {
    Owned { host: Option<Arc<Host>> },
    Shared { host: Arc<Host> },
}

impl HostBinding {
    pub(crate) fn built(&self) -> Option<&Arc<Host>> {
        match self {
            Self::Owned { host } => host.as_ref(),
            Self::Shared { host } => Some(host),
        }
    }

    pub(crate) fn is_built(&self) -> bool {
        self.built().is_some()
    }
}
