//! Utils module - Utility functions and helpers

pub mod logging;
pub mod uri;
