//! Domain models for the labsheet system.

mod patient;
mod test_result;

pub use patient::*;
pub use test_result::*;
