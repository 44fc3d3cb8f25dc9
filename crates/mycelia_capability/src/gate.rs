//! Authorization gate.
//!
//! Per invocation: look up the code, validate the request, extract its
//! actions, resolve every (path, action) pair against the caller's policies,
//! bind the modifier chain, then run the chain down to `execute`. The gate
//! owns no state beyond the shared read-only registry and performs no I/O.

use crate::capability::Capability;
use crate::modifier::{ModifierSet, Next};
use crate::registry::CapabilityRegistry;
use mycelia_core::{CapabilityError, GateError, GateResult};
use mycelia_policy::{Principal, authorize};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Entry point binding principals to a frozen registry
#[derive(Debug, Clone)]
pub struct Gate {
    registry: Arc<CapabilityRegistry>,
}

impl Gate {
    /// Create a gate over a registry
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// The registry
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Bind an authenticated principal
    #[must_use]
    pub fn bind(&self, principal: Principal) -> Caller {
        Caller {
            principal: Arc::new(principal),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// An authenticated principal bound to the registry.
///
/// Handed to `execute` and to modifiers so a capability can call another
/// capability under the same policies.
#[derive(Debug, Clone)]
pub struct Caller {
    principal: Arc<Principal>,
    registry: Arc<CapabilityRegistry>,
}

impl Caller {
    /// The principal
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The registry this caller invokes against
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Authorization-checked invoker for `code`; lookup happens per call
    #[must_use]
    pub fn capability(&self, code: impl Into<String>) -> Invoker<'_> {
        Invoker {
            caller: self,
            code: code.into(),
        }
    }

    /// Invoke a capability with untyped input
    ///
    /// # Errors
    ///
    /// Returns one of the five gate error kinds
    pub async fn invoke(&self, code: &str, input: Value) -> GateResult<Value> {
        let handle = self.registry.lookup(code).ok_or_else(|| GateError::NotFound {
            code: code.to_string(),
        })?;
        handle.invoke(input, self).await
    }

    /// Invoke a capability with a typed request and response
    ///
    /// # Errors
    ///
    /// Returns one of the five gate error kinds; a response that does not
    /// decode as `Resp` is a capability error
    pub async fn call<Req, Resp>(&self, code: &str, request: &Req) -> GateResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let input =
            serde_json::to_value(request).map_err(|e| GateError::invalid(code, e.to_string()))?;
        let output = self.invoke(code, input).await?;
        serde_json::from_value(output).map_err(|e| {
            CapabilityError::with_source(format!("unexpected response from {code}"), e).into()
        })
    }
}

/// Bound invoker for one capability code
#[derive(Debug, Clone)]
pub struct Invoker<'a> {
    caller: &'a Caller,
    code: String,
}

impl Invoker<'_> {
    /// Target code
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Invoke with untyped input
    ///
    /// # Errors
    ///
    /// Returns one of the five gate error kinds
    pub async fn call(&self, input: Value) -> GateResult<Value> {
        self.caller.invoke(&self.code, input).await
    }
}

/// Validate, authorize and execute one request.
pub(crate) async fn run<C: Capability>(
    capability: &C,
    modifiers: &ModifierSet<C>,
    input: Value,
    caller: &Caller,
) -> GateResult<Value> {
    let code = capability.code();
    let principal = caller.principal();

    let request: C::Request =
        serde_json::from_value(input).map_err(|e| GateError::invalid(code, e.to_string()))?;
    capability
        .check(&request)
        .map_err(|reason| GateError::invalid(code, reason))?;

    let records = capability.extract_actions(&request);
    let authorization = authorize(principal.policies(), &records).map_err(|denial| {
        debug!(capability = code, principal = principal.id(), %denial, "request denied");
        GateError::denied(code)
    })?;

    let chain = modifiers.bind(code, authorization.modifiers())?;
    debug!(
        capability = code,
        principal = principal.id(),
        pairs = authorization.pairs(),
        modifiers = chain.len(),
        "request authorized"
    );

    let response = Next::new(capability, &chain).run(request, caller).await?;
    serde_json::to_value(response).map_err(|e| {
        CapabilityError::with_source(format!("{code} produced an unserializable response"), e)
            .into()
    })
}
