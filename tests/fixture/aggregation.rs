//! Tests for assertion evaluation and failure aggregation: failure
//! isolation between siblings, exact single-failure reporting, combined
//! multi-failure reporting, and deserialization failure handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;

use super::*;

/// When exactly one assertion fails, the run reports that failure as
/// itself, not wrapped in an aggregate.
#[tokio::test]
async fn a_single_failure_is_reported_as_itself() {
    let mut fixture = TestFixture::new(DateStartup);

    let err = fixture
        .when_getting("date")
        .should_return_success()
        .should_return_status(StatusCode::NOT_FOUND)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, FixtureError::Assertion(_)));
    assert!(err.to_string().contains("expected status 404"));
}

/// A wrong body field and a wrong status in the same run surface together
/// in one combined failure.
#[tokio::test]
async fn independent_failures_are_reported_together() {
    let mut fixture = TestFixture::new(DateStartup);

    let err = fixture
        .when_getting("widgets/6")
        .should_return_json(|widget: &Widget| {
            check!(widget.id == 5, "expected widget id 5, got {}", widget.id);
            Ok(())
        })
        .should_return_status(StatusCode::NOT_FOUND)
        .run()
        .await
        .unwrap_err();

    let FixtureError::Aggregate(aggregate) = &err else {
        panic!("expected an aggregate failure, got {err}");
    };
    assert_eq!(aggregate.failures().len(), 2);
    let rendered = err.to_string();
    assert!(rendered.contains("expected widget id 5, got 6"));
    assert!(rendered.contains("expected status 404"));
}

/// A body that fails to deserialize produces exactly one captured failure,
/// skips that assertion's sub-predicates, and leaves siblings untouched.
#[tokio::test]
async fn a_deserialization_failure_skips_only_its_own_predicates() {
    let mut fixture = TestFixture::new(DateStartup);
    let predicate_ran = Arc::new(AtomicBool::new(false));
    let flag = predicate_ran.clone();

    let err = fixture
        .when_getting("malformed")
        .should_return_success()
        .should_return_json(move |_: &DateDto| {
            flag.store(true, Ordering::SeqCst);
        })
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, FixtureError::Deserialize(_)));
    assert!(!predicate_ran.load(Ordering::SeqCst));
}

/// Several predicates can share one deserialization; each failure is
/// captured independently.
#[tokio::test]
async fn body_predicates_share_one_deserialization() {
    let mut fixture = TestFixture::new(DateStartup);

    let err = fixture
        .when_getting("widgets/3")
        .should_return_json_all::<Widget>(vec![
            Box::new(|widget| {
                check!(widget.id == 4, "wrong id {}", widget.id);
                Ok(())
            }),
            Box::new(|widget| {
                check!(widget.name == "other", "wrong name {:?}", widget.name);
                Ok(())
            }),
        ])
        .run()
        .await
        .unwrap_err();

    let FixtureError::Aggregate(aggregate) = &err else {
        panic!("expected an aggregate failure, got {err}");
    };
    assert_eq!(aggregate.failures().len(), 2);
    assert!(err.to_string().contains("wrong id 3"));
    assert!(err.to_string().contains("wrong name"));
}

/// Predicates written with plain `assert!` macros panic on failure; the
/// panic is captured like any other assertion failure and siblings still
/// run.
#[tokio::test]
async fn panicking_predicates_are_captured() {
    let mut fixture = TestFixture::new(DateStartup);

    let err = fixture
        .when_getting("widgets/6")
        .should_return_json(|widget: &Widget| {
            assert_eq!(widget.id, 9, "unexpected widget id");
        })
        .should_return_status(StatusCode::NOT_FOUND)
        .run()
        .await
        .unwrap_err();

    let FixtureError::Aggregate(aggregate) = &err else {
        panic!("expected an aggregate failure, got {err}");
    };
    assert_eq!(aggregate.failures().len(), 2);
    assert!(err.to_string().contains("unexpected widget id"));
}

/// Service assertions observe what the run did to the application's state.
#[tokio::test]
async fn service_assertions_see_post_request_state() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .when_getting("date")
        .should_return_success()
        .should_have_service(|journal: Arc<RequestJournal>| async move {
            check!(
                journal.hits().contains(&"/date".to_string()),
                "the request was not journaled: {:?}",
                journal.hits()
            );
            Ok(())
        })
        .run()
        .await
}

/// A failing service assertion is captured without stopping siblings.
#[tokio::test]
async fn failing_service_assertions_are_isolated() {
    let mut fixture = TestFixture::new(DateStartup);

    let err = fixture
        .when_getting("date")
        .should_have_service(|journal: Arc<RequestJournal>| async move {
            check!(
                journal.len() == 999,
                "expected an impossible journal length, got {}",
                journal.len()
            );
            Ok(())
        })
        .should_return_success()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, FixtureError::Assertion(_)));
    assert!(err.to_string().contains("impossible journal length"));
}

/// Resolving a service that was never registered fails that assertion only.
#[tokio::test]
async fn unknown_services_fail_their_assertion() {
    struct Unregistered;

    let mut fixture = TestFixture::new(DateStartup);
    let err = fixture
        .when_getting("date")
        .should_return_success()
        .should_have_service(|_: Arc<Unregistered>| async {})
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no service of type"));
}
