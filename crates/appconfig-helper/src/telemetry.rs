//! Telemetry helpers for the AppConfig helper.
//!
//! This module provides drop-in implementations of [`AppConfigTelemetry`] that
//! make it easy to surface metrics or integrate with external monitoring systems.
//! Consumers can either use the provided counting primitives to expose their own
//! metrics or wrap them in application-specific emitters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::helper::{AppConfigTelemetry, HelperError};

/// Aggregated telemetry counters (all values use relaxed atomics).
#[derive(Debug, Default)]
pub struct TelemetryCounters {
    refresh_updated: AtomicU64,
    refresh_unchanged: AtomicU64,
    refresh_error: AtomicU64,
    refresh_throttled: AtomicU64,
    refresh_contended: AtomicU64,
}

impl TelemetryCounters {
    /// Captures a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            refresh_updated: self.refresh_updated.load(Ordering::Relaxed),
            refresh_unchanged: self.refresh_unchanged.load(Ordering::Relaxed),
            refresh_error: self.refresh_error.load(Ordering::Relaxed),
            refresh_throttled: self.refresh_throttled.load(Ordering::Relaxed),
            refresh_contended: self.refresh_contended.load(Ordering::Relaxed),
        }
    }
}

/// Plain data representation of [`TelemetryCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    /// Number of refreshes that committed a new version.
    pub refresh_updated: u64,
    /// Number of refreshes answered with "no change".
    pub refresh_unchanged: u64,
    /// Number of failed refresh attempts (throttling included).
    pub refresh_error: u64,
    /// Number of failed attempts caused by service throttling.
    pub refresh_throttled: u64,
    /// Number of reads that skipped a due refresh because one was in flight.
    pub refresh_contended: u64,
}

impl fmt::Display for TelemetrySnapshot {
    /// Formats the snapshot metrics into a comma-separated list for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "refresh_updated={}, refresh_unchanged={}, refresh_error={}, refresh_throttled={}, refresh_contended={}",
            self.refresh_updated,
            self.refresh_unchanged,
            self.refresh_error,
            self.refresh_throttled,
            self.refresh_contended
        )
    }
}

/// Telemetry implementation that maintains atomic counters for every signal.
#[derive(Debug, Clone)]
pub struct CountingTelemetry {
    counters: Arc<TelemetryCounters>,
}

impl CountingTelemetry {
    /// Creates a new telemetry instance backed by the provided counter set.
    pub fn new(counters: Arc<TelemetryCounters>) -> Self {
        Self { counters }
    }

    /// Returns the underlying counter set.
    pub fn counters(&self) -> Arc<TelemetryCounters> {
        self.counters.clone()
    }
}

impl Default for CountingTelemetry {
    fn default() -> Self {
        Self::new(Arc::new(TelemetryCounters::default()))
    }
}

impl AppConfigTelemetry for CountingTelemetry {
    fn on_refresh_updated(&self, _version_label: Option<&str>) {
        self.counters
            .refresh_updated
            .fetch_add(1, Ordering::Relaxed);
    }

    fn on_refresh_unchanged(&self) {
        self.counters
            .refresh_unchanged
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Counts the failure and, separately, whether it was throttling.
    fn on_refresh_error(&self, error: &HelperError) {
        self.counters.refresh_error.fetch_add(1, Ordering::Relaxed);
        if matches!(error, HelperError::Transport(err) if err.is_throttled()) {
            self.counters
                .refresh_throttled
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_refresh_contended(&self) {
        self.counters
            .refresh_contended
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Telemetry implementation that forwards events to multiple observers.
///
/// This allows applications to combine counters with logging or custom sinks.
pub struct CompositeTelemetry {
    observers: Vec<Arc<dyn AppConfigTelemetry>>,
}

impl CompositeTelemetry {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Adds a telemetry observer to the dispatcher.
    pub fn with_observer(mut self, telemetry: Arc<dyn AppConfigTelemetry>) -> Self {
        self.observers.push(telemetry);
        self
    }

    /// Extends the dispatcher with additional observers.
    pub fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Arc<dyn AppConfigTelemetry>>,
    {
        self.observers.extend(iter);
    }
}

impl Default for CompositeTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompositeTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTelemetry")
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

impl AppConfigTelemetry for CompositeTelemetry {
    fn on_refresh_updated(&self, version_label: Option<&str>) {
        for observer in &self.observers {
            observer.on_refresh_updated(version_label);
        }
    }

    fn on_refresh_unchanged(&self) {
        for observer in &self.observers {
            observer.on_refresh_unchanged();
        }
    }

    fn on_refresh_error(&self, error: &HelperError) {
        for observer in &self.observers {
            observer.on_refresh_error(error);
        }
    }

    fn on_refresh_contended(&self) {
        for observer in &self.observers {
            observer.on_refresh_contended();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchError;
    use crate::http::HttpError;

    /// Confirms counters increment for every telemetry callback.
    #[test]
    fn counting_telemetry_tracks_all_events() {
        let telemetry = CountingTelemetry::default();
        telemetry.on_refresh_updated(Some("v1"));
        telemetry.on_refresh_unchanged();
        telemetry.on_refresh_unchanged();
        telemetry.on_refresh_error(&HelperError::NotYetFetched);
        telemetry.on_refresh_error(&HelperError::Transport(FetchError::Http(
            HttpError::Throttled,
        )));
        telemetry.on_refresh_contended();

        assert_eq!(
            telemetry.counters().snapshot(),
            TelemetrySnapshot {
                refresh_updated: 1,
                refresh_unchanged: 2,
                refresh_error: 2,
                refresh_throttled: 1,
                refresh_contended: 1,
            }
        );
    }

    /// Ensures composite telemetry broadcasts to every observer.
    #[test]
    fn composite_telemetry_forwards_calls() {
        let primary = Arc::new(CountingTelemetry::default());
        let secondary = Arc::new(CountingTelemetry::default());

        let composite = CompositeTelemetry::new()
            .with_observer(primary.clone())
            .with_observer(secondary.clone());

        composite.on_refresh_updated(None);
        composite.on_refresh_contended();
        composite.on_refresh_error(&HelperError::NotYetFetched);

        for snapshot in [primary.counters().snapshot(), secondary.counters().snapshot()] {
            assert_eq!(snapshot.refresh_updated, 1);
            assert_eq!(snapshot.refresh_contended, 1);
            assert_eq!(snapshot.refresh_error, 1);
            assert_eq!(snapshot.refresh_throttled, 0);
        }
    }

    /// Ensures CountingTelemetry::new preserves the external counter set.
    #[test]
    fn counting_telemetry_uses_external_counters() {
        let counters = Arc::new(TelemetryCounters::default());
        let telemetry = CountingTelemetry::new(counters.clone());
        assert!(Arc::ptr_eq(&counters, &telemetry.counters()));
        assert_eq!(counters.snapshot(), TelemetrySnapshot::default());
    }

    /// Ensures TelemetrySnapshot::fmt prints all fields.
    #[test]
    fn telemetry_snapshot_display_includes_all_fields() {
        let snapshot = TelemetrySnapshot {
            refresh_updated: 1,
            refresh_unchanged: 2,
            refresh_error: 3,
            refresh_throttled: 4,
            refresh_contended: 5,
        };
        let formatted = snapshot.to_string();
        for segment in [
            "refresh_updated=1",
            "refresh_unchanged=2",
            "refresh_error=3",
            "refresh_throttled=4",
            "refresh_contended=5",
        ] {
            assert!(
                formatted.contains(segment),
                "missing segment '{segment}' in '{formatted}'"
            );
        }
    }

    /// Ensures CompositeTelemetry::extend accepts iterators and debug output reports observer count.
    #[test]
    fn composite_telemetry_extend_and_debug() {
        let mut composite = CompositeTelemetry::default();
        let first = Arc::new(CountingTelemetry::default());
        composite.extend(vec![
            first.clone() as Arc<dyn AppConfigTelemetry>,
            Arc::new(crate::helper::NoopTelemetry) as Arc<dyn AppConfigTelemetry>,
        ]);
        composite.on_refresh_unchanged();
        assert_eq!(first.counters().snapshot().refresh_unchanged, 1);
        assert!(format!("{composite:?}").contains("observer_count: 2"));
    }
}
