//! Registration API wire models and the call sequence that mints a key.

pub mod models;
pub mod sequence;
