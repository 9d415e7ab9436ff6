pub mod diagnostic;
pub mod error;
pub mod formatting;
pub mod handler;
pub mod warning;
