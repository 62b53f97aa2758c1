//! Error types for the Strata execution engine.

use alloc::string::String;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for execution operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A protocol operation was called out of sequence.
    #[error("invalid state: cannot {operation} a {node} node that is {state}")]
    InvalidState {
        node: &'static str,
        operation: &'static str,
        state: &'static str,
    },
    /// Opaque failure reported by the storage layer, propagated unmodified.
    #[error("storage error: {message}")]
    Storage { message: String },
    /// A working-memory reservation would exceed its budget.
    ///
    /// Raised by reservation checks and absorbed by the caller (spill or
    /// lossify); never returned from a node operation.
    #[error("memory budget exceeded: requested {requested} bytes with {used} of {budget} in use")]
    MemoryBudgetExceeded {
        requested: usize,
        used: usize,
        budget: usize,
    },
    /// Expression evaluation failed.
    #[error("expression error: {message}")]
    Expression { message: String },
    /// The caller invoked an operation the node did not advertise.
    #[error("{node} node does not support {capability}")]
    CapabilityNotSupported {
        node: &'static str,
        capability: &'static str,
    },
    /// The plan handed to the executor is structurally invalid.
    #[error("invalid plan: {message}")]
    InvalidPlan { message: String },
    /// Execution was interrupted by the caller.
    #[error("canceling statement due to user request")]
    Canceled,
}

impl Error {
    /// Creates an invalid state error.
    pub fn invalid_state(node: &'static str, operation: &'static str, state: &'static str) -> Self {
        Error::InvalidState {
            node,
            operation,
            state,
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Creates a memory budget error.
    pub fn memory_budget_exceeded(requested: usize, used: usize, budget: usize) -> Self {
        Error::MemoryBudgetExceeded {
            requested,
            used,
            budget,
        }
    }

    /// Creates an expression error.
    pub fn expression(message: impl Into<String>) -> Self {
        Error::Expression {
            message: message.into(),
        }
    }

    /// Creates a capability error.
    pub fn capability_not_supported(node: &'static str, capability: &'static str) -> Self {
        Error::CapabilityNotSupported { node, capability }
    }

    /// Creates an invalid plan error.
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Error::InvalidPlan {
            message: message.into(),
        }
    }

    /// Returns true if this error aborts the running query.
    ///
    /// Memory pressure is the only condition handled locally.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MemoryBudgetExceeded { .. })
    }
}
