//! Mycelia Core Types
//!
//! Pure types shared by the policy engine, the capability gate and its adapters.
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod code;
pub mod error;

// Re-exports
pub use action::ActionRecord;
pub use code::{CapabilityCode, CodeError};
pub use error::{CapabilityError, ErrorKind, GateError, GateResult};
