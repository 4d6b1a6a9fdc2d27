//! Core value types shared across workers.

/// A single temperature reading received from a sensor connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sensor_id: u16,
    pub value: f64,
    pub timestamp: i64,
}

/// Exit status a worker thread reports back to the coordinator.
///
/// Mirrors the original's `pthread_exit(retval)` convention, but typed
/// instead of an allocated int pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Success,
    /// The worker observed `ShutdownState::Aborted` and stopped early.
    Interrupted,
    /// The worker hit a condition it cannot recover from on its own
    /// (registry parse error, persistent storage-open failure, invalid port).
    Failed,
}
