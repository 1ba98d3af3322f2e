//! Errors surfaced by the simulation control API.
//!
//! Collaborator failures (catalog, order store) never reach this type; they are
//! logged and absorbed where they happen.

/// Errors returned when a run cannot be configured or started.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// Speed multiplier is zero, negative, or not finite.
    #[error("speed must be a positive, finite multiplier (got {0})")]
    InvalidSpeed(f64),

    /// Admission control was requested with a kitchen capacity of zero.
    #[error("kitchen capacity must be at least 1 when admission control is enabled")]
    InvalidCapacity,

    #[error("unknown arrival rate tier: {0} (expected low, medium, high or rush)")]
    UnknownArrivalRate(String),

    #[error("unknown pause mode: {0} (expected discard or preserve)")]
    UnknownPauseMode(String),
}
