//! Passes which rewrite the IR in place.

pub mod constants;
pub use constants::*;
