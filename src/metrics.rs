use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing index activity.
#[derive(Default)]
pub struct IndexMetrics {
    indexes_created: AtomicU64,
    indexes_reused: AtomicU64,
    documents_uploaded: AtomicU64,
    queries_served: AtomicU64,
}

impl IndexMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a create/ensure call.
    pub fn record_index(&self, created: bool) {
        if created {
            self.indexes_created.fetch_add(1, Ordering::Relaxed);
        } else {
            self.indexes_reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record documents accepted by the backend.
    pub fn record_upload(&self, documents: u64) {
        self.documents_uploaded
            .fetch_add(documents, Ordering::Relaxed);
    }

    /// Record a served vector or semantic query.
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            indexes_created: self.indexes_created.load(Ordering::Relaxed),
            indexes_reused: self.indexes_reused.load(Ordering::Relaxed),
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of index counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Indexes newly created by this process.
    pub indexes_created: u64,
    /// Indexes found already provisioned and reused.
    pub indexes_reused: u64,
    /// Documents accepted by the backend across all uploads.
    pub documents_uploaded: u64,
    /// Queries answered since startup.
    pub queries_served: u64,
}
