//! Capability registry.
//!
//! Capabilities are registered on a [`RegistryBuilder`] at startup; `build`
//! freezes it into a [`CapabilityRegistry`] that is only ever read afterwards
//! and is shared by reference with every request path.

use crate::capability::Capability;
use crate::gate::{self, Caller};
use crate::modifier::ModifierSet;
use crate::schema::CapabilityDescriptor;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use mycelia_core::{CapabilityCode, CodeError, GateResult};
use serde_json::Value;
use std::sync::Arc;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Code already taken
    #[error("Capability already registered: {0}")]
    AlreadyRegistered(String),

    /// Code is not reverse-DNS
    #[error(transparent)]
    InvalidCode(#[from] CodeError),

    /// Modifier registered under an empty code
    #[error("Capability {0} registers a modifier with an empty code")]
    EmptyModifierCode(String),
}

/// Object-safe view of a registered capability
pub trait CapabilityHandle: Send + Sync {
    /// Descriptor
    fn descriptor(&self) -> &CapabilityDescriptor;

    /// Validate, authorize and execute `input` on behalf of `caller`
    fn invoke<'a>(&'a self, input: Value, caller: &'a Caller) -> BoxFuture<'a, GateResult<Value>>;
}

struct Entry<C: Capability> {
    capability: C,
    modifiers: ModifierSet<C>,
    descriptor: CapabilityDescriptor,
}

impl<C: Capability> CapabilityHandle for Entry<C> {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn invoke<'a>(&'a self, input: Value, caller: &'a Caller) -> BoxFuture<'a, GateResult<Value>> {
        Box::pin(gate::run(&self.capability, &self.modifiers, input, caller))
    }
}

/// Mutable registry used during startup
#[derive(Default)]
pub struct RegistryBuilder {
    entries: IndexMap<CapabilityCode, Arc<dyn CapabilityHandle>>,
}

impl RegistryBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability
    ///
    /// # Errors
    ///
    /// Returns error if the code is invalid or already registered
    pub fn register<C: Capability>(&mut self, capability: C) -> Result<(), RegistryError> {
        let code = CapabilityCode::parse(capability.code())?;
        if self.entries.contains_key(&code) {
            return Err(RegistryError::AlreadyRegistered(code.to_string()));
        }

        let modifiers = capability.modifiers();
        if modifiers.codes().any(str::is_empty) {
            return Err(RegistryError::EmptyModifierCode(code.to_string()));
        }

        let descriptor = modifiers.codes().fold(
            CapabilityDescriptor::new(code.as_str(), capability.description())
                .with_input_schema(capability.input_schema()),
            CapabilityDescriptor::with_modifier,
        );

        tracing::info!(capability = %code, modifiers = modifiers.len(), "capability registered");
        self.entries.insert(
            code,
            Arc::new(Entry {
                capability,
                modifiers,
                descriptor,
            }),
        );
        Ok(())
    }

    /// Register a capability, builder style
    ///
    /// # Errors
    ///
    /// Returns error if the code is invalid or already registered
    pub fn with<C: Capability>(mut self, capability: C) -> Result<Self, RegistryError> {
        self.register(capability)?;
        Ok(self)
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            entries: self
                .entries
                .into_iter()
                .map(|(code, entry)| (String::from(code), entry))
                .collect(),
        }
    }
}

/// Immutable lookup of capabilities by code
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: IndexMap<String, Arc<dyn CapabilityHandle>>,
}

impl CapabilityRegistry {
    /// Look up a capability by code
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<&Arc<dyn CapabilityHandle>> {
        self.entries.get(code)
    }

    /// Descriptors in registration order
    pub fn list(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.entries.values().map(|entry| entry.descriptor())
    }

    /// Check if a code is registered
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Number of registered capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
