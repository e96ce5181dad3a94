//! Assertion kinds registered on a fixture.
//!
//! The four kinds form a closed sum type dispatched by exhaustive match in
//! the run loop. All user predicates funnel into [`CheckResult`] through
//! [`IntoCheckResult`], so `assert!`-style closures and `check!`-style
//! closures both compose.

use std::any::Any;

use futures::future::BoxFuture;

use crate::error::{BoxError, FixtureError};
use crate::fixture::TestFixture;
use crate::response::ResponseSnapshot;
use crate::services::ServiceScope;

/// Outcome of a single assertion predicate.
pub type CheckResult = Result<(), BoxError>;

/// A boxed predicate over a typed JSON body, for registering several checks
/// against one deserialization.
pub type JsonCheck<T> = Box<dyn FnOnce(&T) -> CheckResult + Send>;

/// Conversion from a predicate's return value into a [`CheckResult`].
///
/// Lets predicates either return nothing and rely on `assert!` macros, or
/// return an explicit result built with `check!`.
pub trait IntoCheckResult {
    fn into_check_result(self) -> CheckResult;
}

impl IntoCheckResult for () {
    fn into_check_result(self) -> CheckResult {
        Ok(())
    }
}

impl IntoCheckResult for CheckResult {
    fn into_check_result(self) -> CheckResult {
        self
    }
}

pub(crate) type BodyValue = Box<dyn Any + Send>;
pub(crate) type ResponseCheck = Box<dyn FnOnce(&ResponseSnapshot) -> CheckResult + Send>;
pub(crate) type BodyDecoder =
    Box<dyn FnOnce(&ResponseSnapshot) -> Result<BodyValue, FixtureError> + Send>;
pub(crate) type BodyCheck = Box<dyn FnOnce(&BodyValue) -> CheckResult + Send>;
pub(crate) type ServiceCheck = Box<dyn FnOnce(ServiceScope) -> BoxFuture<'static, CheckResult> + Send>;
pub(crate) type ChainSeed = Box<dyn FnOnce(&ResponseSnapshot, &mut TestFixture) -> CheckResult + Send>;

/// One registered assertion. Evaluated in registration order; every kind is
/// failure-isolated from its siblings.
pub(crate) enum Assertion {
    /// Predicate over the raw response.
    Response(ResponseCheck),
    /// One deserialization feeding an ordered list of sub-predicates. A
    /// decode failure is captured once and skips the sub-predicates.
    Body {
        decode: BodyDecoder,
        checks: Vec<BodyCheck>,
    },
    /// Async predicate over a freshly opened service scope.
    Service(ServiceCheck),
    /// Extractor plus configurator seeding a child fixture that shares the
    /// parent's host.
    Chain(ChainSeed),
}
