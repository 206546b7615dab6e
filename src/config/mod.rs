//! # Index Configuration
//!
//! All format and shape constants live in [`constants`]. Interdependent values
//! are documented together and checked with compile-time assertions, so the
//! rest of the crate imports from here instead of defining local copies.

pub mod constants;
pub use constants::*;
