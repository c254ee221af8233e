//! Metrics events for the pipeline.
//!
//! Events record through the `metrics` facade. No exporter is installed here;
//! an embedding process decides where the counters go.

pub mod events;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which logs it at trace level and records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use hearth::metrics::events::RecordsCleaned;
///
/// emit!(RecordsCleaned { count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
