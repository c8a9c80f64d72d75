//! Observability for DittoBase
//!
//! - Structured logging (JSON lines)
//! - Counters and the open-handle gauge
//! - Scope-based operation tracing
//!
//! Observability is read-only: nothing here changes the outcome of an
//! operation, and logging failures are swallowed.
//!
//! ```ignore
//! use dittobase::observability::{Logger, ObservationScope};
//!
//! Logger::info("DATASET_INGESTED", &[("rows", "42")]);
//!
//! let scope = ObservationScope::new("INGEST", &[("filename", "sales.csv")]);
//! // ... do work ...
//! scope.complete(&[]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    if event.is_fatal() {
        Logger::fatal(event.as_str(), fields);
    } else {
        Logger::info(event.as_str(), fields);
    }
}

/// Log a high-volume event (handle open/close, scratch cleanup)
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::trace(event.as_str(), fields);
}
