//! Helper-level telemetry abstractions.
//!
//! Embedders implement [`AppConfigTelemetry`] to observe refresh outcomes
//! without reaching into helper internals. This is where failures that are
//! not raised to readers (the cache was warm) become visible.

use super::HelperError;

/// Telemetry hook invoked on refresh events.
pub trait AppConfigTelemetry: Send + Sync {
    /// Called after a new configuration version was committed.
    fn on_refresh_updated(&self, _version_label: Option<&str>) {}
    /// Called when the service reported no new version.
    fn on_refresh_unchanged(&self) {}
    /// Called when a refresh attempt fails, whether or not the error reaches a caller.
    fn on_refresh_error(&self, _error: &HelperError) {}
    /// Called when a read skipped a due refresh because another one was in flight.
    fn on_refresh_contended(&self) {}
}

/// Default telemetry implementation that performs no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl AppConfigTelemetry for NoopTelemetry {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies the default no-op telemetry accepts invocations without panicking.
    #[test]
    fn noop_telemetry_is_safe_to_call() {
        let telemetry = NoopTelemetry;
        telemetry.on_refresh_updated(Some("v1"));
        telemetry.on_refresh_unchanged();
        telemetry.on_refresh_error(&HelperError::NotYetFetched);
        telemetry.on_refresh_contended();
    }
}
