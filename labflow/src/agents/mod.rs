//! Collaborators that call a text generator: planning, path extraction, and
//! per-domain script generation.

pub mod path_extractor;
pub mod planner;
pub mod specialist;
