//! The functional test fixture: a fluent builder over an in-memory host.
//!
//! A fixture moves through two independent state machines. Build state goes
//! from unbuilt to built exactly once; configuration (`having_*`) is only
//! legal before that transition. Run state goes idle, request pending
//! (`when_*`), completed (`run`), and always lands back on idle so a shared
//! fixture can serve the next test against the same host.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::mem;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use fake::{Dummy, Fake, Faker};
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument::WithSubscriber;

use crate::aggregator::FailureAggregator;
use crate::assertion::{
    Assertion, BodyCheck, BodyDecoder, BodyValue, IntoCheckResult, JsonCheck,
};
use crate::client::ClientOptions;
use crate::config::{environment, AppConfigBuilder};
use crate::error::{BoxError, FixtureError};
use crate::host::{
    ClientAction, ConfigAction, Host, HostBinding, LoggingAction, ServiceAction, Startup,
};
use crate::logging::{LoggingBuilder, TestOutput};
use crate::request::RequestSpec;
use crate::response::ResponseSnapshot;
use crate::services::{ServiceCollection, ServiceScope};

type BootstrapAction =
    Arc<dyn Fn(ServiceScope) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type PropertyValue = Arc<dyn Any + Send + Sync>;

/// A functional test fixture for one hosted application.
///
/// Configuration methods (`having_*`) queue work that is replayed when the
/// host is built; act methods (`when_*`) describe the single request of the
/// current run; assertion methods (`should_*`) queue checks that all run
/// against the response, with every failure collected into one reported
/// outcome.
///
/// All fluent methods take and return `&mut self`, in the style of
/// `std::process::Command`, because a fixture shared across tests outlives
/// each individual run.
///
/// ```ignore
/// let mut fixture = TestFixture::new(AppStartup);
/// fixture
///     .having_config_value("future_offset", "1d")
///     .when_getting("date/future")
///     .should_return_success()
///     .should_return_json(|date: &DateDto| {
///         check!(date.utc_now > Utc::now(), "offset was not applied");
///         Ok(())
///     })
///     .run()
///     .await?;
/// ```
pub struct TestFixture {
    startup: Arc<dyn Startup>,
    environment: Option<String>,
    config_actions: Vec<ConfigAction>,
    service_actions: Vec<ServiceAction>,
    client_actions: Vec<ClientAction>,
    logging_actions: Vec<LoggingAction>,
    bootstrap_actions: Vec<BootstrapAction>,
    properties: HashMap<String, PropertyValue>,
    rng: StdRng,
    output: TestOutput,
    binding: HostBinding,
    request: Option<RequestSpec>,
    assertions: Vec<Assertion>,
}

impl TestFixture {
    /// Creates a fixture that will build and own its host.
    pub fn new(startup: impl Startup) -> Self {
        Self::with_binding(Arc::new(startup), HostBinding::Owned { host: None })
    }

    /// Creates a child fixture bound to an already built host. Used for
    /// chained requests; the child never rebuilds and never re-applies
    /// configuration.
    pub(crate) fn attached(startup: Arc<dyn Startup>, host: Arc<Host>) -> Self {
        Self::with_binding(startup, HostBinding::Shared { host })
    }

    fn with_binding(startup: Arc<dyn Startup>, binding: HostBinding) -> Self {
        Self {
            startup,
            environment: None,
            config_actions: Vec::new(),
            service_actions: Vec::new(),
            client_actions: Vec::new(),
            logging_actions: Vec::new(),
            bootstrap_actions: Vec::new(),
            properties: HashMap::new(),
            rng: StdRng::from_os_rng(),
            output: TestOutput::default(),
            binding,
            request: None,
            assertions: Vec::new(),
        }
    }

    // ----- configuration ---------------------------------------------------

    /// Sets the environment name the host is built with. Defaults to
    /// [`environment::PRODUCTION`].
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_environment(&mut self, name: impl Into<String>) -> &mut Self {
        self.assert_unbuilt("having_environment");
        self.environment = Some(name.into());
        self
    }

    /// Queues a configuration callback, replayed in registration order at
    /// build time after the startup's defaults.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_config(
        &mut self,
        configure: impl FnOnce(&mut AppConfigBuilder) + Send + 'static,
    ) -> &mut Self {
        self.assert_unbuilt("having_config");
        self.config_actions.push(Box::new(configure));
        self
    }

    /// Sets a single configuration value.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_config_value(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let (key, value) = (key.into(), value.into());
        self.having_config(move |config| {
            config.set(key, value);
        })
    }

    /// Queues a service registration callback, replayed after the startup's
    /// own registrations so test doubles shadow the defaults.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_services(
        &mut self,
        configure: impl FnOnce(&mut ServiceCollection) + Send + 'static,
    ) -> &mut Self {
        self.assert_unbuilt("having_services");
        self.service_actions.push(Box::new(configure));
        self
    }

    /// Queues a client options callback.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_client_options(
        &mut self,
        configure: impl FnOnce(&mut ClientOptions) + Send + 'static,
    ) -> &mut Self {
        self.assert_unbuilt("having_client_options");
        self.client_actions.push(Box::new(configure));
        self
    }

    /// Prefixes every request URI with the given path.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_path_base(&mut self, path: impl Into<String>) -> &mut Self {
        let path = path.into();
        self.having_client_options(move |options| options.base_path = path)
    }

    /// Queues a logging configuration callback. The log channel always keeps
    /// its sink into the current test output.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_logging(
        &mut self,
        configure: impl FnOnce(&mut LoggingBuilder) + Send + 'static,
    ) -> &mut Self {
        self.assert_unbuilt("having_logging");
        self.logging_actions.push(Box::new(configure));
        self
    }

    /// Registers a bootstrap callback, run against a fresh service scope on
    /// every run, after the host is built and before the request is sent.
    /// A bootstrap failure aborts the run and is never aggregated.
    ///
    /// # Panics
    /// When the host has already been built.
    pub fn having_bootstrap<F, Fut>(&mut self, bootstrap: F) -> &mut Self
    where
        F: Fn(ServiceScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.assert_unbuilt("having_bootstrap");
        self.bootstrap_actions
            .push(Arc::new(move |scope| Box::pin(bootstrap(scope))));
        self
    }

    /// Runs the configurator immediately if the host is still unbuilt, and
    /// does nothing otherwise. The idiom for one-time setup of a fixture
    /// shared by several tests.
    pub fn having_setup(&mut self, configure: impl FnOnce(&mut Self)) -> &mut Self {
        if !self.binding.is_built() {
            configure(self);
        }
        self
    }

    /// Rebinds the fixture's log output channel. Legal in any state so each
    /// test sharing a built fixture can claim the host's log lines.
    pub fn having_test_output(&mut self, output: TestOutput) -> &mut Self {
        if let Some(host) = self.binding.built() {
            host.log().rebind(output.clone());
        }
        self.output = output;
        self
    }

    /// Stores a value in the fixture's property bag for cross-step sharing.
    /// Chained child fixtures start with an empty bag; forward values
    /// explicitly where needed.
    pub fn having_property<T: Send + Sync + 'static>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> &mut Self {
        self.properties.insert(key.into(), Arc::new(value));
        self
    }

    /// Reads a property back, `None` when absent or of another type.
    pub fn property<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.properties
            .get(key)
            .and_then(|value| value.clone().downcast::<T>().ok())
    }

    /// Generates a fake instance of a model type.
    pub fn fake<T: Dummy<Faker>>(&self) -> T {
        Faker.fake()
    }

    /// The fixture's random generator, for ad-hoc test data.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    // ----- lifecycle -------------------------------------------------------

    /// Builds the host now. Subsequent calls are no-ops; `run` builds on
    /// demand, so calling this is only needed to inspect the host up front.
    pub fn build(&mut self) -> &mut Self {
        self.build_host();
        self
    }

    /// The built host, when there is one.
    pub fn host(&self) -> Option<Arc<Host>> {
        self.binding.built().cloned()
    }

    /// Whether the host has been built (or inherited from a parent).
    pub fn is_built(&self) -> bool {
        self.binding.is_built()
    }

    fn build_host(&mut self) -> Arc<Host> {
        if let Some(host) = self.binding.built() {
            return host.clone();
        }
        let environment = self
            .environment
            .take()
            .unwrap_or_else(|| environment::PRODUCTION.to_string());
        let host = Arc::new(Host::build(
            self.startup.as_ref(),
            environment,
            mem::take(&mut self.config_actions),
            mem::take(&mut self.logging_actions),
            mem::take(&mut self.service_actions),
            mem::take(&mut self.client_actions),
            self.output.clone(),
        ));
        self.binding = HostBinding::Owned {
            host: Some(host.clone()),
        };
        host
    }

    fn assert_unbuilt(&self, operation: &str) {
        if self.binding.is_built() {
            panic!("cannot call `{operation}` after the test host has been built");
        }
    }

    // ----- act -------------------------------------------------------------

    /// Sets the pending request. Calling a `when` method again before `run`
    /// simply replaces the descriptor; the last write wins.
    pub fn when(&mut self, spec: RequestSpec) -> &mut Self {
        self.request = Some(spec);
        self
    }

    /// GET at the given relative URI.
    pub fn when_getting(&mut self, uri: impl Into<String>) -> &mut Self {
        self.when(RequestSpec::get(uri))
    }

    /// GET for the given entity and id.
    pub fn when_getting_by_id(&mut self, entity: &str, id: impl Display) -> &mut Self {
        self.when(RequestSpec::get(format!("{entity}/{id}")))
    }

    /// POST for the given entity with a JSON body.
    ///
    /// # Panics
    /// When the body cannot be serialized; a value built by the test that
    /// does not serialize is a test bug.
    pub fn when_creating<B: Serialize>(&mut self, entity: &str, body: &B) -> &mut Self {
        let spec = json_spec(Method::POST, entity.to_string(), body);
        self.when(spec)
    }

    /// PUT for the given entity and id with a JSON body.
    ///
    /// # Panics
    /// When the body cannot be serialized.
    pub fn when_updating<B: Serialize>(
        &mut self,
        entity: &str,
        id: impl Display,
        body: &B,
    ) -> &mut Self {
        let spec = json_spec(Method::PUT, format!("{entity}/{id}"), body);
        self.when(spec)
    }

    /// PATCH for the given entity and id with a JSON body.
    ///
    /// # Panics
    /// When the body cannot be serialized.
    pub fn when_patching<B: Serialize>(
        &mut self,
        entity: &str,
        id: impl Display,
        body: &B,
    ) -> &mut Self {
        let spec = json_spec(Method::PATCH, format!("{entity}/{id}"), body);
        self.when(spec)
    }

    /// DELETE for the given entity and id.
    pub fn when_deleting(&mut self, entity: &str, id: impl Display) -> &mut Self {
        self.when(RequestSpec::delete(format!("{entity}/{id}")))
    }

    // ----- assert ----------------------------------------------------------

    /// Registers a predicate over the raw response.
    pub fn should_return<F, R>(&mut self, check: F) -> &mut Self
    where
        F: FnOnce(&ResponseSnapshot) -> R + Send + 'static,
        R: IntoCheckResult,
    {
        self.assertions.push(Assertion::Response(Box::new(
            move |response| check(response).into_check_result(),
        )));
        self
    }

    /// Asserts the response status is exactly `status`.
    pub fn should_return_status(&mut self, status: StatusCode) -> &mut Self {
        self.should_return(move |response| {
            crate::check!(
                response.status() == status,
                "expected status {status}, got {}",
                response.status()
            );
            Ok(())
        })
    }

    /// Asserts the response status is 2xx.
    pub fn should_return_success(&mut self) -> &mut Self {
        self.should_return(|response| {
            crate::check!(
                response.status().is_success(),
                "expected a success status, got {}",
                response.status()
            );
            Ok(())
        })
    }

    pub fn should_return_bad_request(&mut self) -> &mut Self {
        self.should_return_status(StatusCode::BAD_REQUEST)
    }

    pub fn should_return_unauthorized(&mut self) -> &mut Self {
        self.should_return_status(StatusCode::UNAUTHORIZED)
    }

    pub fn should_return_forbidden(&mut self) -> &mut Self {
        self.should_return_status(StatusCode::FORBIDDEN)
    }

    pub fn should_return_not_found(&mut self) -> &mut Self {
        self.should_return_status(StatusCode::NOT_FOUND)
    }

    pub fn should_return_internal_server_error(&mut self) -> &mut Self {
        self.should_return_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Asserts the response is a redirect with the given status to the given
    /// location. Disable `follow_redirects` on the client options to observe
    /// the redirect itself.
    pub fn should_return_redirect_to(
        &mut self,
        status: StatusCode,
        location: impl Into<String>,
    ) -> &mut Self {
        let location = location.into();
        self.should_return(move |response| {
            crate::check!(
                response.status() == status,
                "expected redirect status {status}, got {}",
                response.status()
            );
            let target = response.header(axum::http::header::LOCATION);
            crate::check!(
                target == Some(location.as_str()),
                "expected redirect to {location:?}, got {target:?}"
            );
            Ok(())
        })
    }

    /// Registers a body assertion: deserialize the body as JSON once, then
    /// run the predicate. A deserialization failure is captured as that
    /// assertion's single failure and its predicate is skipped; sibling
    /// assertions still run.
    pub fn should_return_json<T, F, R>(&mut self, check: F) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(&T) -> R + Send + 'static,
        R: IntoCheckResult,
    {
        self.should_return_json_all::<T>(vec![Box::new(move |body| {
            check(body).into_check_result()
        })])
    }

    /// Registers a body assertion with several predicates sharing one
    /// deserialization.
    pub fn should_return_json_all<T>(&mut self, checks: Vec<JsonCheck<T>>) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        let decode: BodyDecoder = Box::new(|response: &ResponseSnapshot| {
            response.json::<T>().map(|body| Box::new(body) as BodyValue)
        });
        let checks = checks
            .into_iter()
            .map(|check| {
                Box::new(move |body: &BodyValue| match body.downcast_ref::<T>() {
                    Some(typed) => check(typed),
                    None => Err("response body decoded to an unexpected type".into()),
                }) as BodyCheck
            })
            .collect();
        self.assertions.push(Assertion::Body { decode, checks });
        self
    }

    /// Asserts the body is an empty JSON array.
    pub fn should_return_empty_collection(&mut self) -> &mut Self {
        self.should_return_json(|items: &Vec<serde_json::Value>| {
            crate::check!(
                items.is_empty(),
                "expected an empty collection, got {} items",
                items.len()
            );
            Ok(())
        })
    }

    /// Asserts the body is a JSON array of exactly `count` items.
    pub fn should_return_collection_of_length(&mut self, count: usize) -> &mut Self {
        self.should_return_json(move |items: &Vec<serde_json::Value>| {
            crate::check!(
                items.len() == count,
                "expected a collection of {count} items, got {}",
                items.len()
            );
            Ok(())
        })
    }

    /// Registers an assertion over a service resolved from a fresh scope
    /// after the request has completed. The scope is released when the
    /// predicate finishes, on every exit path.
    pub fn should_have_service<T, F, Fut>(&mut self, check: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoCheckResult,
    {
        self.should_have_service_scope(move |scope| async move {
            let service = match scope.resolve::<T>() {
                Ok(service) => service,
                Err(missing) => return Err(Box::new(missing) as BoxError),
            };
            check(service).await.into_check_result()
        })
    }

    /// Registers an assertion over a whole fresh service scope.
    pub fn should_have_service_scope<F, Fut>(&mut self, check: F) -> &mut Self
    where
        F: FnOnce(ServiceScope) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoCheckResult,
    {
        self.assertions.push(Assertion::Service(Box::new(move |scope| {
            Box::pin(async move { check(scope).await.into_check_result() })
        })));
        self
    }

    /// Registers a chained request: extract a context value from this run's
    /// response, configure a child fixture bound to the same host, and run
    /// it. A failing child run surfaces as a single aggregated entry in this
    /// run's outcome.
    pub fn should_satisfy_request<C, E, F>(&mut self, extract: E, configure: F) -> &mut Self
    where
        C: Send + 'static,
        E: FnOnce(&ResponseSnapshot) -> Result<C, BoxError> + Send + 'static,
        F: FnOnce(C, &mut TestFixture) + Send + 'static,
    {
        self.assertions.push(Assertion::Chain(Box::new(
            move |response, child| {
                let context = extract(response)?;
                configure(context, child);
                Ok(())
            },
        )));
        self
    }

    /// Registers a chained request whose context is the JSON body of this
    /// run's response.
    pub fn should_satisfy_json_request<T, F>(&mut self, configure: F) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(T, &mut TestFixture) + Send + 'static,
    {
        self.should_satisfy_request(
            |response| response.json::<T>().map_err(|e| Box::new(e) as BoxError),
            configure,
        )
    }

    // ----- run -------------------------------------------------------------

    /// Runs the fixture: build the host if needed, replay bootstrap
    /// callbacks, send the pending request, then evaluate every registered
    /// assertion, in order, isolating failures from one another.
    ///
    /// Zero failures succeed silently; one failure is returned as itself;
    /// several are combined into [`FixtureError::Aggregate`]. The pending
    /// request and assertion list are cleared afterwards, win or lose, so
    /// the fixture can be reused against the same host.
    pub async fn run(&mut self) -> Result<(), FixtureError> {
        self.run_protocol().await
    }

    fn run_protocol(&mut self) -> BoxFuture<'_, Result<(), FixtureError>> {
        Box::pin(async move {
            let outcome = self.execute().await;
            self.reset();
            outcome
        })
    }

    async fn execute(&mut self) -> Result<(), FixtureError> {
        if self.request.is_none() {
            return Err(FixtureError::MissingActStep);
        }
        if self.assertions.is_empty() {
            return Err(FixtureError::MissingAssertions);
        }

        let host = self.build_host();
        let dispatch = host.log().dispatch().clone();
        let startup = self.startup.clone();

        let work = async {
            // Bootstrap callbacks share one fresh scope per run and abort the
            // run on the first failure.
            if !self.bootstrap_actions.is_empty() {
                let scope = host.services().create_scope();
                for bootstrap in &self.bootstrap_actions {
                    bootstrap(scope.clone())
                        .await
                        .map_err(FixtureError::Bootstrap)?;
                }
            }

            let spec = self.request.take().ok_or(FixtureError::MissingActStep)?;
            tracing::info!(method = %spec.method(), uri = %spec.uri(), "sending request");
            let response = host.send(&spec).await?;
            tracing::info!(status = %response.status(), "received response");

            let assertions = mem::take(&mut self.assertions);
            let mut aggregator = FailureAggregator::new();

            for assertion in assertions {
                match assertion {
                    Assertion::Response(check) => aggregator.check(|| check(&response)),
                    Assertion::Body { decode, checks } => {
                        if let Some(body) = aggregator.try_capture(|| decode(&response)) {
                            for check in checks {
                                aggregator.check(|| check(&body));
                            }
                        }
                    }
                    Assertion::Service(check) => {
                        let scope = host.services().create_scope();
                        aggregator.check_async(check(scope)).await;
                    }
                    Assertion::Chain(seed) => {
                        let mut child = TestFixture::attached(startup.clone(), host.clone());
                        match seed(&response, &mut child) {
                            Ok(()) => {
                                if let Err(failure) = child.run_protocol().await {
                                    aggregator.capture(FixtureError::Chain(Box::new(failure)));
                                }
                            }
                            Err(extraction) => {
                                // The child never ran; disarm its drop guard.
                                child.reset();
                                aggregator.capture(FixtureError::Assertion(extraction));
                            }
                        }
                    }
                }
            }

            aggregator.finish()
        };

        work.with_subscriber(dispatch).await
    }

    fn reset(&mut self) {
        self.request = None;
        self.assertions.clear();
    }
}

impl Drop for TestFixture {
    /// A fixture dropped with a pending request or unrun assertions is a
    /// silently skipped test; fail loudly instead.
    fn drop(&mut self) {
        if (self.request.is_some() || !self.assertions.is_empty()) && !std::thread::panicking() {
            panic!(
                "test fixture dropped with an unrun request or unrun assertions; \
                 call `run` before the fixture goes out of scope"
            );
        }
    }
}

fn json_spec<B: Serialize>(method: Method, uri: String, body: &B) -> RequestSpec {
    match RequestSpec::new(method, uri.clone()).with_json(body) {
        Ok(spec) => spec,
        Err(e) => panic!("failed to serialize the request body for {uri}: {e}"),
    }
}
