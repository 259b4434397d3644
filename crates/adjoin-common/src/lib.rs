//! Shared building blocks for the adjoin crates.

pub mod capability;
pub mod error;
pub mod paths;
pub mod persist;
