//! Builtin capabilities.
//!
//! In-memory stand-ins for the document store and the message queue, used by
//! the server out of the box and by tests exercising the gate end to end.

pub mod documents;
pub mod queue;

pub use documents::{
    Counted, Deleted, DocumentRequest, DocumentResponse, Documents, Inserted, RowFilter, Updated,
};
pub use queue::{BatchLimit, Queue, QueueRequest, QueueResponse};

use crate::registry::{CapabilityRegistry, RegistryBuilder, RegistryError};

/// Register every builtin capability
///
/// # Errors
///
/// Returns error if a builtin code is already registered
pub fn register_all(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register(Documents::new())?;
    builder.register(Queue::new())?;
    Ok(())
}

/// Registry holding only the builtin capabilities
///
/// # Errors
///
/// Returns error if registration fails
pub fn registry() -> Result<CapabilityRegistry, RegistryError> {
    let mut builder = RegistryBuilder::new();
    register_all(&mut builder)?;
    Ok(builder.build())
}

/// Reject path segments that would break pattern matching
pub(crate) fn check_segment(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value.contains('/') {
        return Err(format!("{field} must not contain '/'"));
    }
    Ok(())
}
