//! AppConfig helper module facade.
//!
//! This module re-exports the public helper API while wiring the submodules
//! that implement the refresh cycle, diagnostics state, and telemetry hooks.

mod core;
pub(crate) mod refresh;
pub(crate) mod state;
pub(crate) mod telemetry;
#[cfg(test)]
pub(crate) mod test_support;

pub use self::core::{AppConfigHelper, HelperBuilder, HelperError, RefreshOutcome};
pub use state::{HelperState, StatusSnapshot};
pub use telemetry::{AppConfigTelemetry, NoopTelemetry};
