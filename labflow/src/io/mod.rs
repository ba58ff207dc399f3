//! I/O helpers for labflow: collaborators with side effects, behind traits.

pub mod config;
pub mod executor;
pub mod llm;
pub mod observability;
pub mod process;
pub mod prompt;
pub mod resources;
pub mod retriever;
