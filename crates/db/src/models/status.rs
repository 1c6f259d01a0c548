//! Execution state enum mapping to the `execution_states` lookup table.
//!
//! Variant discriminants match the seed data order (1-based).

/// State ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StateId = i16;

/// Execution lifecycle state.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Inserted by the gateway, waiting for a worker.
    Pending = 1,
    /// Claimed and being executed by a worker.
    Running = 2,
    /// Ended with a result archive (rows may still have errored).
    Finished = 3,
    /// Aborted by an internal failure before producing results.
    Failed = 4,
    /// Stopped on user request.
    Cancelled = 5,
}

impl ExecutionState {
    /// Return the database state ID.
    pub fn id(self) -> StateId {
        self as StateId
    }
}

impl From<ExecutionState> for StateId {
    fn from(value: ExecutionState) -> Self {
        value as StateId
    }
}
