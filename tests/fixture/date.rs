//! The date scenarios: current time, configured future offset, and a
//! chained second reading.

use chrono::{NaiveTime, Utc};

use super::*;

/// GET `/date` with no configuration returns a 2xx response whose body is a
/// timestamp within a second of now.
#[tokio::test]
async fn getting_the_date_returns_now() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .when_getting("date")
        .should_return_success()
        .should_return_json(|date: &DateDto| {
            let drift = (Utc::now() - date.utc_now).num_milliseconds().abs();
            check!(drift <= 1000, "timestamp drifted {drift}ms from now");
            Ok(())
        })
        .run()
        .await
}

/// With a `future_offset` of one day configured into the application's
/// config, GET `/date/future` returns today's date plus one day.
#[tokio::test]
async fn the_future_date_honors_the_configured_offset() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .having_config_value("future_offset", "1d")
        .when_getting("date/future")
        .should_return_success()
        .should_return_json(|date: &DateDto| {
            let expected =
                Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc() + chrono::Duration::days(1);
            let drift = (expected - date.utc_now).num_milliseconds().abs();
            check!(
                drift <= 1000,
                "expected {expected}, got {} ({drift}ms apart)",
                date.utc_now
            );
            Ok(())
        })
        .run()
        .await
}

/// Getting the date twice through a chained request yields a second
/// timestamp strictly after the first.
#[tokio::test]
async fn getting_the_date_again_moves_forward() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture
        .when_getting("date")
        .should_return_success()
        .should_satisfy_json_request::<DateDto, _>(|first, f| {
            f.when_getting("date")
                .should_return_success()
                .should_return_json(move |second: &DateDto| {
                    check!(
                        second.utc_now > first.utc_now,
                        "second reading {} was not after the first {}",
                        second.utc_now,
                        first.utc_now
                    );
                    Ok(())
                });
        })
        .run()
        .await
}

/// The offset can be seeded through the property bag and read back when
/// configuring, the way a shared fixture forwards data between steps.
#[tokio::test]
async fn the_offset_can_round_trip_through_the_property_bag() -> Result<(), FixtureError> {
    let mut fixture = TestFixture::new(DateStartup);
    fixture.having_property("future_offset", "3h".to_string());

    let offset = fixture
        .property::<String>("future_offset")
        .expect("the property was just stored");
    fixture
        .having_config_value("future_offset", offset.as_str())
        .when_getting("date/future")
        .should_return_success()
        .should_return_json(|date: &DateDto| {
            let expected = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
                + chrono::Duration::hours(3);
            let drift = (expected - date.utc_now).num_milliseconds().abs();
            check!(drift <= 1000, "expected {expected}, got {}", date.utc_now);
            Ok(())
        })
        .run()
        .await
}
