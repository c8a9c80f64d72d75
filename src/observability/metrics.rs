//! Metrics registry
//!
//! Monotonic counters plus one gauge (open store handles). All updates use
//! Relaxed ordering; values are exact once the operations that produced them
//! have returned.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by the dataset service and the HTTP layer
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    datasets_ingested: AtomicU64,
    ingest_failures: AtomicU64,
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    rows_inserted: AtomicU64,
    rows_deleted: AtomicU64,
    cells_updated: AtomicU64,
    mutation_failures: AtomicU64,
    /// Gauge: handles currently open
    open_store_handles: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Ingestion

    pub fn increment_datasets_ingested(&self) {
        self.datasets_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ingest_failures(&self) {
        self.ingest_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Query

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Mutation

    pub fn increment_rows_inserted(&self) {
        self.rows_inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rows_deleted(&self) {
        self.rows_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cells_updated(&self) {
        self.cells_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mutation_failures(&self) {
        self.mutation_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Store handles

    pub fn handle_opened(&self) {
        self.open_store_handles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handle_closed(&self) {
        self.open_store_handles.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of store handles currently open
    pub fn open_store_handles(&self) -> u64 {
        self.open_store_handles.load(Ordering::Relaxed)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datasets_ingested: self.datasets_ingested.load(Ordering::Relaxed),
            ingest_failures: self.ingest_failures.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            cells_updated: self.cells_updated.load(Ordering::Relaxed),
            mutation_failures: self.mutation_failures.load(Ordering::Relaxed),
            open_store_handles: self.open_store_handles.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub datasets_ingested: u64,
    pub ingest_failures: u64,
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub rows_inserted: u64,
    pub rows_deleted: u64,
    pub cells_updated: u64,
    pub mutation_failures: u64,
    pub open_store_handles: u64,
}
