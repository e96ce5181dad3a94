//! Fluent functional test fixtures for Axum applications.
//!
//! A [`TestFixture`] hosts an application in memory and drives one
//! arrange-act-assert cycle per run: `having_*` methods queue environment,
//! configuration, service, client, and logging overrides that are replayed
//! when the host is built; a `when_*` method describes the single HTTP
//! request of the run; `should_*` methods queue assertions over the raw
//! response, the deserialized JSON body, post-request service state, or a
//! chained follow-up request against the same host. Every assertion runs
//! even when an earlier one fails, and all failures of a run are reported
//! together.
//!
//! ```ignore
//! let mut fixture = TestFixture::new(AppStartup);
//! fixture
//!     .when_creating("widgets", &new_widget)
//!     .should_return_status(StatusCode::CREATED)
//!     .should_return_json(|widget: &Widget| {
//!         check!(widget.name == new_widget.name, "name was not persisted");
//!         Ok(())
//!     })
//!     .should_satisfy_json_request::<Widget, _>(|created, f| {
//!         f.when_getting_by_id("widgets", created.id)
//!             .should_return_success();
//!     })
//!     .run()
//!     .await?;
//! ```

pub mod assertion;
pub mod client;
pub mod config;
pub mod error;
pub mod fixture;
pub mod host;
pub mod logging;
pub mod request;
pub mod response;
pub mod services;

mod aggregator;

pub use assertion::{CheckResult, IntoCheckResult, JsonCheck};
pub use client::ClientOptions;
pub use config::{environment, AppConfig, AppConfigBuilder};
pub use error::{AggregateFailure, BoxError, FixtureError};
pub use fixture::TestFixture;
pub use host::{Host, Startup};
pub use logging::{LoggingBuilder, TestOutput};
pub use request::RequestSpec;
pub use response::ResponseSnapshot;
pub use services::{ServiceCollection, ServiceProvider, ServiceScope};

pub mod prelude {
    pub use crate::check;
    pub use crate::{
        AppConfig, AppConfigBuilder, BoxError, ClientOptions, FixtureError, LoggingBuilder,
        RequestSpec, ResponseSnapshot, ServiceCollection, ServiceProvider, ServiceScope, Startup,
        TestFixture, TestOutput,
    };
    pub use fake::{Dummy, Fake, Faker};
}
