//! Plan-execution control loop for multi-step command-line workflows.
//!
//! A controller turns a natural-language request plus a snapshot of the
//! input directory into an ordered plan, hands each step to a specialist that
//! writes a script, runs that script through a remote executor, and then
//! advances, retries, or stops. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state merging, progression,
//!   routing heuristics, invariants). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (text generation, SSH/local
//!   execution, knowledge files, config, the observability log), each behind
//!   a trait so tests can script them.
//!
//! [`agents`] builds prompts for the text generator. Orchestration modules
//! ([`controller`], [`gateway`], [`graph`]) wire core logic to the
//! collaborators, and [`session`] assembles them from a config.

pub mod agents;
pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod gateway;
pub mod graph;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
