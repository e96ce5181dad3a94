//! Tests for the configuration surface: the configure-before-build guard,
//! one-time setup, the property bag, and override ordering.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::*;

/// Every `having_*` configuration method must refuse to run once the host
/// has been built, loudly rather than silently ignoring the change.
#[test]
fn configuration_after_build_is_a_usage_error() {
    let mut fixture = TestFixture::new(DateStartup);
    fixture.build();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        fixture.having_environment("development");
    }));

    assert!(outcome.is_err());
}

#[test]
fn config_and_service_overrides_after_build_are_usage_errors() {
    let mut fixture = TestFixture::new(DateStartup);
    fixture.build();

    assert!(catch_unwind(AssertUnwindSafe(|| {
        fixture.having_config_value("future_offset", "1d");
    }))
    .is_err());
    assert!(catch_unwind(AssertUnwindSafe(|| {
        fixture.having_services(|services| {
            services.insert(Greeter {
                greeting: "too late".to_string(),
            });
        });
    }))
    .is_err());
    assert!(catch_unwind(AssertUnwindSafe(|| {
        fixture.having_bootstrap(|_| async { Ok(()) });
    }))
    .is_err());
}

/// `having_setup` runs its configurator exactly once for a shared fixture:
/// immediately while unbuilt, and never again once the host exists.
#[test]
fn having_setup_is_a_no_op_once_built() {
    let mut fixture = TestFixture::new(DateStartup);
    let mut calls = 0;

    fixture.having_setup(|_| calls += 1);
    fixture.build();
    fixture.having_setup(|_| calls += 1);

    assert_eq!(calls, 1);
}

#[test]
fn properties_are_typed_by_key() {
    let mut fixture = TestFixture::new(DateStartup);
    fixture.having_property("attempts", 3u32);

    assert_eq!(fixture.property::<u32>("attempts").as_deref(), Some(&3));
    assert!(fixture.property::<String>("attempts").is_none());
    assert!(fixture.property::<u32>("missing").is_none());
}

#[test]
fn the_environment_defaults_to_production() {
    let mut fixture = TestFixture::new(DateStartup);
    let host = fixture.build().host().unwrap();

    assert_eq!(host.environment(), axum_fixture::environment::PRODUCTION);
}

#[test]
fn the_environment_can_be_overridden() {
    let mut fixture = TestFixture::new(DateStartup);
    let host = fixture
        .having_environment(axum_fixture::environment::DEVELOPMENT)
        .build()
        .host()
        .unwrap();

    assert_eq!(host.environment(), axum_fixture::environment::DEVELOPMENT);
}

/// Queued configuration callbacks replay after the startup's defaults, so
/// the test's value wins.
#[test]
fn config_overrides_replace_startup_defaults() {
    let mut fixture = TestFixture::new(DateStartup);
    let host = fixture
        .having_config_value("future_offset", "2h")
        .build()
        .host()
        .unwrap();

    assert_eq!(host.config().get("future_offset"), Some("2h"));
    assert_eq!(host.config().environment(), "production");
}

/// Service registrations queued on the fixture shadow the startup's own
/// registration of the same type.
#[tokio::test]
async fn service_overrides_shadow_startup_registrations() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .having_services(|services| {
            services.insert(Greeter {
                greeting: "goedendag".to_string(),
            });
        })
        .when_getting("greet")
        .should_return_success()
        .should_return(|response| {
            check!(
                response.text() == "goedendag",
                "expected the overridden greeting, got {:?}",
                response.text()
            );
            Ok(())
        })
        .run()
        .await
}

/// The client options queue feeds the built host's client; a base path makes
/// every relative URI resolve under it.
#[tokio::test]
async fn client_options_apply_a_base_path() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(NestedStartup);
    fixture
        .having_path_base("/api")
        .when_getting("greet")
        .should_return_success()
        .run()
        .await
}

struct NestedStartup;

impl Startup for NestedStartup {
    fn configure_services(&self, config: &AppConfig, services: &mut ServiceCollection) {
        DateStartup.configure_services(config, services);
    }

    fn build_router(&self, config: &AppConfig, services: &ServiceProvider) -> axum::Router {
        axum::Router::new().nest("/api", DateStartup.build_router(config, services))
    }
}
