//! Internal telemetry for the relay.
//!
//! Groups the observability components:
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding Prometheus metric.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::telemetry::events::InternalEvent::emit($event)
    };
}
