use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    files_attempted: AtomicU64,
    parse_failures: AtomicU64,
    fragments_indexed: AtomicU64,
    index_builds: AtomicU64,
    queries_answered: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one parse attempt and whether it failed.
    pub fn record_parse(&self, failed: bool) {
        self.files_attempted.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.parse_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a successful index build over `fragments` fragments.
    pub fn record_index_build(&self, fragments: u64) {
        self.index_builds.fetch_add(1, Ordering::Relaxed);
        self.fragments_indexed
            .fetch_add(fragments, Ordering::Relaxed);
    }

    /// Record an answered query.
    pub fn record_query(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_attempted: self.files_attempted.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            fragments_indexed: self.fragments_indexed.load(Ordering::Relaxed),
            index_builds: self.index_builds.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files handed to the parser since startup.
    pub files_attempted: u64,
    /// Files whose parse failed since startup.
    pub parse_failures: u64,
    /// Fragments fed into successful index builds since startup.
    pub fragments_indexed: u64,
    /// Successful index builds since startup.
    pub index_builds: u64,
    /// Queries answered since startup.
    pub queries_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_parses_and_builds() {
        let metrics = ServiceMetrics::new();
        metrics.record_parse(false);
        metrics.record_parse(true);
        metrics.record_index_build(3);
        metrics.record_query();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_attempted, 2);
        assert_eq!(snapshot.parse_failures, 1);
        assert_eq!(snapshot.fragments_indexed, 3);
        assert_eq!(snapshot.index_builds, 1);
        assert_eq!(snapshot.queries_answered, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        assert_eq!(ServiceMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
