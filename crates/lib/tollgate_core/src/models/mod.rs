//! Domain models shared across the crate.

pub mod token;
