//! Deterministic, pure logic of the control loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! workflow state and return deterministic outputs suitable for tests.

pub mod budget;
pub mod error;
pub mod invariants;
pub mod progression;
pub mod routing;
pub mod script;
pub mod snapshot;
pub mod state_update;
pub mod types;
