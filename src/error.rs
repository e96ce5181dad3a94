//! Error types for the fixture library.
//!
//! The taxonomy distinguishes usage errors (a bug in the test itself, fatal
//! and never aggregated) from assertion failures (captured per assertion and
//! reported together at the end of a run).

use std::fmt;

use thiserror::Error;

/// Boxed error type returned by user-supplied predicates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised by a fixture run.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// `run` was called without a configured act step.
    #[error("no act step was configured: call a `when` method before `run`")]
    MissingActStep,
    /// `run` was called with zero registered assertions. A request with
    /// nothing to check would pass vacuously, which is almost always a test
    /// authoring mistake.
    #[error("no assertions were registered: add `should` steps before `run`")]
    MissingAssertions,
    /// A bootstrap callback failed. Bootstrap failures abort the run before
    /// the request is sent and are never aggregated.
    #[error("bootstrap callback failed: {0}")]
    Bootstrap(BoxError),
    /// The in-memory request could not be constructed or its response body
    /// could not be read.
    #[error("failed to send request: {0}")]
    Transport(BoxError),
    /// The request did not complete within the configured client timeout.
    #[error("request did not complete within {0:?}")]
    Timeout(std::time::Duration),
    /// A single assertion predicate failed or panicked.
    #[error("assertion failed: {0}")]
    Assertion(BoxError),
    /// The response body could not be deserialized for a body assertion.
    #[error("failed to deserialize response body: {0}")]
    Deserialize(#[from] serde_json::Error),
    /// A service of the requested type has never been registered.
    #[error("no service of type {0} is registered")]
    UnknownService(&'static str),
    /// A configuration value exists but could not be parsed.
    #[error("invalid value {value:?} for configuration key {key:?}: {message}")]
    Config {
        key: String,
        value: String,
        message: String,
    },
    /// A chained request run by a child fixture failed. The child's own
    /// failures stay wrapped as a single entry in the parent's outcome.
    #[error("chained request failed: {0}")]
    Chain(Box<FixtureError>),
    /// Two or more assertions failed during the same run.
    #[error(transparent)]
    Aggregate(AggregateFailure),
}

/// A combined failure wrapping every assertion failure captured during one
/// run, so a test author sees all independent violations at once instead of
/// only the first.
#[derive(Debug)]
pub struct AggregateFailure {
    failures: Vec<FixtureError>,
}

impl AggregateFailure {
    pub(crate) fn new(failures: Vec<FixtureError>) -> Self {
        Self { failures }
    }

    /// The individual failures, in assertion registration order.
    pub fn failures(&self) -> &[FixtureError] {
        &self.failures
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} assertions failed during the run:", self.failures.len())?;
        for (index, failure) in self.failures.iter().enumerate() {
            writeln!(f, "  {}: {failure}", index + 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}

/// Early-returns an assertion failure when the condition does not hold.
///
/// Intended for use inside assertion predicates registered on a fixture:
///
/// ```ignore
/// fixture.should_return_json(|widget: &Widget| {
///     check!(widget.id > 0, "expected a persisted id, got {}", widget.id);
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! check {
    ($cond:expr) => {
        $crate::check!($cond, "check failed: {}", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return ::std::result::Result::Err(::std::format!($($arg)+).into());
        }
    };
}
