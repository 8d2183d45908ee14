//! Intermediate Representation (IR) module.
//!
//! The three-address code consumed by the backend and the table of runtime
//! intrinsics it may call.

pub mod tac;
pub use tac::*;
pub mod intrinsic;
pub use intrinsic::Intrinsic;
