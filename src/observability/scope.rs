//! ObservationScope for start/complete logging around one operation
//!
//! - `{name}_BEGIN` on creation (TRACE)
//! - `{name}_COMPLETE` on `complete` (INFO, with `elapsed_ms`)
//! - `{name}_FAILED` on `fail` (ERROR, with `code` and `reason`)
//! - `{name}_INCOMPLETE` on drop without either (WARN), e.g. after a panic

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs the outcome of one operation
///
/// ```ignore
/// let scope = ObservationScope::new("QUERY", &[("dataset_id", id.as_str())]);
/// match run() {
///     Ok(v) => scope.complete(&[("rows", "3")]),
///     Err(e) => scope.fail(e.code(), &e.to_string()),
/// }
/// ```
pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    started_at: Instant,
    finished: bool,
}

impl ObservationScope {
    /// Create a new scope; logs `{name}_BEGIN`
    pub fn new(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        let event = format!("{}_BEGIN", name);
        Logger::trace(&event, fields);

        Self {
            name,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started_at: Instant::now(),
            finished: false,
        }
    }

    /// Elapsed milliseconds since the scope was opened
    pub fn elapsed_ms(&self) -> String {
        self.started_at.elapsed().as_millis().to_string()
    }

    /// Mark the scope as completed; logs `{name}_COMPLETE`
    pub fn complete(mut self, extra_fields: &[(&str, &str)]) {
        self.finished = true;
        let event = format!("{}_COMPLETE", self.name);
        let elapsed = self.elapsed_ms();

        let mut all_fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.extend(extra_fields.iter().copied());
        all_fields.push(("elapsed_ms", elapsed.as_str()));

        Logger::info(&event, &all_fields);
    }

    /// Mark the scope as failed; logs `{name}_FAILED`
    pub fn fail(mut self, code: &str, reason: &str) {
        self.finished = true;
        let event = format!("{}_FAILED", self.name);

        let mut all_fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.push(("code", code));
        all_fields.push(("reason", reason));

        Logger::error(&event, &all_fields);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            let event = format!("{}_INCOMPLETE", self.name);
            Logger::warn(&event, &[("reason", "scope dropped without completion")]);
        }
    }
}
