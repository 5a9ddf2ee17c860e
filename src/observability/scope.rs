//! ObservationScope for BEGIN/COMPLETE bracketing of a unit of work
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` with `duration_ms` when `complete()` is called
//! - Logs `{name}_FAILED` when `fail()` is called
//! - Logs `{name}_INCOMPLETE` on drop if neither happened

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs the start and end of a unit of work
///
/// ```ignore
/// let scope = ObservationScope::with_fields("SYNC_CYCLE", &[("cycle_id", &id)]);
/// // ... run the cycle ...
/// scope.complete_with_fields(&[("delivered", "3")]);
/// ```
pub struct ObservationScope {
    name: String,
    finished: bool,
    started: Instant,
    fields: Vec<(String, String)>,
}

impl ObservationScope {
    /// Create a new observation scope, logging `{name}_BEGIN`
    pub fn new(name: &str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Create a new observation scope carrying fields on every line it logs
    pub fn with_fields(name: &str, fields: &[(&str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);

        Self {
            name: name.to_string(),
            finished: false,
            started: Instant::now(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Milliseconds since the scope was opened
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Mark the scope as successfully completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope as successfully completed with additional fields
    pub fn complete_with_fields(mut self, extra_fields: &[(&str, &str)]) {
        self.finished = true;
        let duration = self.elapsed_ms().to_string();
        let mut all = self.field_refs();
        all.extend(extra_fields.iter().copied());
        all.push(("duration_ms", duration.as_str()));
        Logger::info(&format!("{}_COMPLETE", self.name), &all);
    }

    /// Mark the scope as failed with a reason (ERROR severity)
    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        let mut all = self.field_refs();
        all.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &all);
    }

    /// Mark the scope as failed with FATAL severity
    pub fn fail_fatal(mut self, reason: &str) {
        self.finished = true;
        let mut all = self.field_refs();
        all.push(("reason", reason));
        Logger::fatal(&format!("{}_FAILED", self.name), &all);
    }

    /// Check if the scope has been finished
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            let mut all = self.field_refs();
            all.push(("reason", "scope dropped without completion"));
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &all);
        }
    }
}
