//! Modifier chain.
//!
//! A `modify` policy names a transform registered on the target capability.
//! At call time each named transform is bound to its policy argument and the
//! bound transforms are composed onion-style: the first one discovered is the
//! outermost, and the innermost `next` is the capability's own `execute`.

use crate::capability::Capability;
use crate::gate::Caller;
use async_trait::async_trait;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use mycelia_core::{GateError, GateResult};
use mycelia_policy::ModifierRef;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// A request/response transform for capability `C`.
///
/// `apply` may rewrite the request before calling `next`, refuse by returning
/// without calling `next`, or post-process what `next` returns.
#[async_trait]
pub trait Modifier<C: Capability>: Send + Sync + 'static {
    /// Policy argument; deserialization is the argument schema
    type Arg: DeserializeOwned + Send + Sync + 'static;

    /// Semantic checks on a deserialized argument
    ///
    /// # Errors
    ///
    /// Returns the reason the argument is malformed
    fn validate(&self, _arg: &Self::Arg) -> Result<(), String> {
        Ok(())
    }

    /// Run the transform
    ///
    /// # Errors
    ///
    /// Returns a refusal or any failure raised further down the chain
    async fn apply(
        &self,
        arg: &Self::Arg,
        request: C::Request,
        caller: &Caller,
        next: Next<'_, C>,
    ) -> GateResult<C::Response>;
}

/// Modifier with its argument bound, ready to run
#[async_trait]
pub(crate) trait BoundModifier<C: Capability>: Send + Sync {
    async fn apply(
        &self,
        request: C::Request,
        caller: &Caller,
        next: Next<'_, C>,
    ) -> GateResult<C::Response>;
}

struct Bound<C, M: Modifier<C>>
where
    C: Capability,
{
    modifier: Arc<M>,
    arg: M::Arg,
    _capability: PhantomData<fn() -> C>,
}

#[async_trait]
impl<C, M> BoundModifier<C> for Bound<C, M>
where
    C: Capability,
    M: Modifier<C>,
{
    async fn apply(
        &self,
        request: C::Request,
        caller: &Caller,
        next: Next<'_, C>,
    ) -> GateResult<C::Response> {
        self.modifier.apply(&self.arg, request, caller, next).await
    }
}

/// Type-erased registration of a modifier
trait Binder<C: Capability>: Send + Sync {
    fn bind(&self, arg: &Value) -> Result<Box<dyn BoundModifier<C>>, String>;
}

struct Registered<M>(Arc<M>);

impl<C, M> Binder<C> for Registered<M>
where
    C: Capability,
    M: Modifier<C>,
{
    fn bind(&self, arg: &Value) -> Result<Box<dyn BoundModifier<C>>, String> {
        let arg: M::Arg = serde_json::from_value(arg.clone()).map_err(|e| e.to_string())?;
        self.0.validate(&arg)?;
        Ok(Box::new(Bound {
            modifier: Arc::clone(&self.0),
            arg,
            _capability: PhantomData,
        }))
    }
}

/// Ordered chain of bound modifiers for one invocation
pub(crate) type Chain<C> = Vec<Box<dyn BoundModifier<C>>>;

/// Modifiers a capability accepts, by code
pub struct ModifierSet<C: Capability> {
    entries: IndexMap<String, Box<dyn Binder<C>>>,
}

impl<C: Capability> ModifierSet<C> {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Register a modifier under `code`, replacing any previous one
    #[must_use]
    pub fn with<M: Modifier<C>>(mut self, code: impl Into<String>, modifier: M) -> Self {
        self.entries
            .insert(code.into(), Box::new(Registered(Arc::new(modifier))));
        self
    }

    /// Whether a modifier is registered under `code`
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Registered codes in registration order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered modifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no modifier is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve and bind policy modifier references, outermost first.
    ///
    /// # Errors
    ///
    /// Returns a modifier configuration error if a code is unknown or an
    /// argument is malformed. Nothing has run at that point.
    pub(crate) fn bind(&self, capability: &str, refs: &[ModifierRef]) -> GateResult<Chain<C>> {
        refs.iter()
            .map(|modifier| {
                let binder = self.entries.get(&modifier.code).ok_or_else(|| {
                    configuration_error(capability, &modifier.code, "unknown modifier")
                })?;
                binder
                    .bind(&modifier.arg)
                    .map_err(|reason| configuration_error(capability, &modifier.code, &reason))
            })
            .collect()
    }
}

fn configuration_error(capability: &str, modifier: &str, reason: &str) -> GateError {
    tracing::warn!(capability, modifier, reason, "policy modifier misconfigured");
    GateError::ModifierConfiguration {
        code: capability.to_string(),
        modifier: modifier.to_string(),
        reason: reason.to_string(),
    }
}

impl<C: Capability> Default for ModifierSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Remainder of the pipeline after the current modifier
pub struct Next<'a, C: Capability> {
    capability: &'a C,
    chain: &'a [Box<dyn BoundModifier<C>>],
}

impl<'a, C: Capability> Next<'a, C> {
    pub(crate) fn new(capability: &'a C, chain: &'a [Box<dyn BoundModifier<C>>]) -> Self {
        Self { capability, chain }
    }

    /// Modifiers still ahead of `execute`
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    /// Continue with the next modifier, or the capability itself
    pub fn run<'b>(
        self,
        request: C::Request,
        caller: &'b Caller,
    ) -> BoxFuture<'b, GateResult<C::Response>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((head, rest)) => {
                    head.apply(request, caller, Next::new(self.capability, rest))
                        .await
                }
                None => self.capability.execute(request, caller).await,
            }
        })
    }
}
