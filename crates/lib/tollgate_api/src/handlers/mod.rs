//! Request handlers.

pub mod tokens;
