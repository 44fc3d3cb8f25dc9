//! Mycelia Capability System
//!
//! Capabilities are named units of backend behavior. Every invocation goes
//! through the gate: the request is validated, its declared actions are
//! authorized against the caller's policies, and the matching modifiers are
//! wrapped around the capability's own `execute`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtin;
pub mod capability;
pub mod gate;
pub mod modifier;
pub mod registry;
pub mod schema;

pub use capability::Capability;
pub use gate::{Caller, Gate, Invoker};
pub use modifier::{Modifier, ModifierSet, Next};
pub use registry::{CapabilityHandle, CapabilityRegistry, RegistryBuilder, RegistryError};
pub use schema::CapabilityDescriptor;
