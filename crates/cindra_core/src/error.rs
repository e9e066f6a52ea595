//! Errors surfaced by the container, the dispatch table and the registries.

use thiserror::Error;

pub mod messages {
    pub const EMPTY_CONTAINER: &str = "container holds no value";
    pub const EMPTY_OPERAND: &str = "operand container holds no value";
    pub const NULL_SOURCE: &str = "dispatch received a null source pointer";
    pub const NULL_DESTINATION: &str = "dispatch received a null destination pointer";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnyError {
    #[error("type registry capacity of {capacity} distinct types exceeded")]
    CapacityExceeded { capacity: usize },

    #[error("failed to allocate {size} bytes (align {align}) for a boxed value")]
    AllocationFailure { size: usize, align: usize },

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("type mismatch: expected `{expected}`, container holds `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Carries the raw operation code; see
    /// [`Operation::from_code`](crate::dispatch::Operation::from_code).
    #[error("operation code {0} is not supported by the dispatch function")]
    UnsupportedOperation(u8),

    #[error("type `{0}` is not copyable")]
    NotCopyable(&'static str),

    #[error("no operator registered in slot {slot}")]
    OperatorSlotUnregistered { slot: usize },

    #[error("operator slot {slot} is already registered")]
    OperatorSlotOccupied { slot: usize },

    #[error("operator slot {slot} is out of range (capacity {capacity})")]
    OperatorSlotOutOfRange { slot: usize, capacity: usize },

    #[error("operator in slot {slot} takes {expected} operand(s), {supplied} supplied")]
    ArityMismatch {
        slot: usize,
        expected: usize,
        supplied: usize,
    },

    #[error("registry configuration is already fixed")]
    AlreadyConfigured,
}
