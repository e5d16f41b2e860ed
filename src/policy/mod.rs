//! Acceptance policy for generated accounts.

pub mod quality;
