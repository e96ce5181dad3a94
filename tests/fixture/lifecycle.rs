//! Tests for the host lifecycle: build-once semantics, bootstrap callbacks,
//! and the rebindable log output channel.

use std::sync::Arc;

use super::*;

/// `build` transitions to built exactly once; later builds and runs keep
/// returning the same host instance.
#[tokio::test]
async fn the_host_is_built_exactly_once() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    let first = fixture.build().host().unwrap();
    let again = fixture.build().host().unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    fixture
        .when_getting("date")
        .should_return_success()
        .run()
        .await?;

    let after_run = fixture.host().unwrap();
    assert!(Arc::ptr_eq(&first, &after_run));
    Ok(())
}

/// Bootstrap callbacks are configuration: registered before build, replayed
/// against a fresh scope on every run, in registration order.
#[tokio::test]
async fn bootstrap_callbacks_replay_on_every_run() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .having_bootstrap(|scope| async move {
            let journal = scope.resolve::<RequestJournal>()?;
            journal.record("bootstrap-1");
            Ok(())
        })
        .having_bootstrap(|scope| async move {
            let journal = scope.resolve::<RequestJournal>()?;
            journal.record("bootstrap-2");
            Ok(())
        });

    fixture
        .when_getting("date")
        .should_return_success()
        .run()
        .await?;

    fixture
        .when_getting("date")
        .should_have_service(|journal: Arc<RequestJournal>| async move {
            let bootstraps: Vec<String> = journal
                .hits()
                .into_iter()
                .filter(|hit| hit.starts_with("bootstrap"))
                .collect();
            check!(
                bootstraps == ["bootstrap-1", "bootstrap-2", "bootstrap-1", "bootstrap-2"],
                "bootstrap callbacks did not replay in order: {bootstraps:?}"
            );
            Ok(())
        })
        .run()
        .await
}

/// A failing bootstrap aborts the run before the request is sent and is
/// reported as itself, never aggregated with assertion failures.
#[tokio::test]
async fn a_bootstrap_failure_aborts_the_run() {
    let mut fixture = TestFixture::new(DateStartup);
    fixture.having_bootstrap(|_| async { Err("seed data unavailable".into()) });

    let err = fixture
        .when_getting("date")
        .should_return_not_found()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, FixtureError::Bootstrap(_)));
    assert!(err.to_string().contains("seed data unavailable"));
}

/// Host and fixture log lines land in the bound test output.
#[tokio::test]
async fn log_lines_flow_to_the_bound_output() -> Result<(), FixtureError> {
    let output = TestOutput::memory();
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .having_test_output(output.clone())
        .when_getting("date")
        .should_return_success()
        .run()
        .await?;

    let contents = output.contents();
    assert!(contents.contains("bootstrapping test host"));
    assert!(contents.contains("sending request"));
    assert!(contents.contains("received response"));
    Ok(())
}

/// The output channel of a built, shared fixture can be re-pointed at the
/// next test's output between runs.
#[tokio::test]
async fn the_output_channel_rebinds_between_runs() -> Result<(), FixtureError> {
    let first = TestOutput::memory();
    let second = TestOutput::memory();
    let mut fixture = TestFixture::new(DateStartup);

    fixture
        .having_test_output(first.clone())
        .when_getting("date")
        .should_return_success()
        .run()
        .await?;
    fixture
        .having_test_output(second.clone())
        .when_getting("date")
        .should_return_success()
        .run()
        .await?;

    assert!(first.contents().contains("sending request"));
    assert!(second.contents().contains("sending request"));
    assert!(!second.contents().contains("bootstrapping test host"));
    Ok(())
}

/// Logging configuration is applied at build time.
#[tokio::test]
async fn logging_levels_are_configurable() -> Result<(), FixtureError> {
    let output = TestOutput::memory();
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .having_logging(|logging| {
            logging.with_level(tracing::Level::WARN);
        })
        .having_test_output(output.clone())
        .when_getting("date")
        .should_return_success()
        .run()
        .await?;

    assert!(!output.contents().contains("sending request"));
    Ok(())
}
