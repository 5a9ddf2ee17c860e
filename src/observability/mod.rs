//! Observability for chronosync
//!
//! - Structured JSON line logging
//! - Typed lifecycle events
//! - BEGIN/COMPLETE scopes around cycles
//!
//! Logging is synchronous and side-effect free with respect to sync state:
//! a failed write to stdout never changes what the engine does.
//!
//! ```ignore
//! use chronosync::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::WatermarkCommitted, &[("position", "103")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{format_line, Logger, Severity};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Fatal events are written at FATAL severity, everything else at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log an event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}
