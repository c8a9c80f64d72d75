//! Observable lifecycle events
//!
//! Events are explicit and typed so log consumers can match on stable names.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Process startup begins
    BootStart,
    /// Configuration loaded
    ConfigLoaded,
    /// HTTP server bound and serving
    Serving,
    /// Boot failed
    BootFailed,

    // Store handles
    /// Store handle opened
    StoreOpened,
    /// Store handle released
    StoreClosed,

    // Ingestion
    /// Scratch upload file removed
    ScratchRemoved,
    /// Dataset created and loaded
    DatasetIngested,
    /// Partial dataset removed after a failed load
    DatasetDiscarded,

    // Query
    /// Query executed successfully
    QueryExecuted,
    /// Query rejected by read-only policy
    QueryRejected,

    // Mutation
    /// Row appended
    RowInserted,
    /// Row removed
    RowDeleted,
    /// Cell updated
    CellUpdated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "DITTOBASE_STARTUP_BEGIN",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "DITTOBASE_SERVING",
            Event::BootFailed => "DITTOBASE_STARTUP_FAILED",

            Event::StoreOpened => "STORE_OPENED",
            Event::StoreClosed => "STORE_CLOSED",

            Event::ScratchRemoved => "SCRATCH_REMOVED",
            Event::DatasetIngested => "DATASET_INGESTED",
            Event::DatasetDiscarded => "DATASET_DISCARDED",

            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",

            Event::RowInserted => "ROW_INSERTED",
            Event::RowDeleted => "ROW_DELETED",
            Event::CellUpdated => "CELL_UPDATED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::BootFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
