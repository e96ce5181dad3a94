//! Per-run collection of assertion failures.
//!
//! Created when assertion evaluation starts, populated by every failing
//! predicate, inspected once at the end: zero failures is silent success,
//! one failure is rethrown as itself, several become one aggregate error.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::FutureExt;

use crate::assertion::CheckResult;
use crate::error::{AggregateFailure, FixtureError};

#[derive(Default)]
pub(crate) struct FailureAggregator {
    failures: Vec<FixtureError>,
}

impl FailureAggregator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs a synchronous predicate, capturing an `Err` or a panic.
    pub(crate) fn check(&mut self, predicate: impl FnOnce() -> CheckResult) {
        match catch_unwind(AssertUnwindSafe(predicate)) {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => self.failures.push(FixtureError::Assertion(failure)),
            Err(payload) => self
                .failures
                .push(FixtureError::Assertion(panic_message(payload).into())),
        }
    }

    /// Runs an asynchronous predicate, capturing an `Err` or a panic.
    pub(crate) async fn check_async(&mut self, predicate: impl Future<Output = CheckResult>) {
        match AssertUnwindSafe(predicate).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => self.failures.push(FixtureError::Assertion(failure)),
            Err(payload) => self
                .failures
                .push(FixtureError::Assertion(panic_message(payload).into())),
        }
    }

    /// Runs a fallible step whose value later checks depend on. The error is
    /// captured as-is and `None` signals the dependents to be skipped.
    pub(crate) fn try_capture<T>(
        &mut self,
        step: impl FnOnce() -> Result<T, FixtureError>,
    ) -> Option<T> {
        match step() {
            Ok(value) => Some(value),
            Err(failure) => {
                self.failures.push(failure);
                None
            }
        }
    }

    pub(crate) fn capture(&mut self, failure: FixtureError) {
        self.failures.push(failure);
    }

    pub(crate) fn finish(self) -> Result<(), FixtureError> {
        let mut failures = self.failures;
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(FixtureError::Aggregate(AggregateFailure::new(failures))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else {
        "assertion panicked".to_string()
    }
}
