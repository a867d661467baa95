pub mod context;
pub mod error;
pub mod instance;
pub mod postgres;
pub mod reconciler;
pub mod status;
pub mod volumes;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use instance::{Fact, Instance, ObservedInstances, CONTAINER_DATABASE};
pub use reconciler::{error_policy, reconcile, FINALIZER};
pub use status::RevisionOutcome;
