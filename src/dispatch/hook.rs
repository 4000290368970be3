//! Around-invocation hooks and the dispatcher that runs them.
//!
//! Every capability, tool or resource, is reached through `Dispatcher::dispatch`, so a
//! hook registered once applies to all of them. Hooks run in registration order: the
//! first registered is the outermost.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::capability::{Capability, CapabilityDescriptor, CapabilityKind, Invocation};
use crate::dispatch::context::RequestContext;
use crate::error::AppError;

#[async_trait]
pub trait InvocationHook: Send + Sync {
    /// Run around the rest of the chain. Returning without calling `next.run` stops the
    /// invocation; the capability is then never executed.
    async fn around(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> Result<Value, AppError>;
}

/// Remainder of the hook chain, ending at the target capability.
pub struct Next<'a> {
    hooks: &'a [Arc<dyn InvocationHook>],
    capability: &'a dyn Capability,
}

impl<'a> Next<'a> {
    pub fn descriptor(&self) -> &'a CapabilityDescriptor {
        self.capability.descriptor()
    }

    pub async fn run(
        self,
        invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        match self.hooks.split_first() {
            Some((hook, rest)) => {
                let next = Next {
                    hooks: rest,
                    capability: self.capability,
                };
                hook.around(invocation, ctx, next).await
            }
            None => self.capability.invoke(invocation, ctx).await,
        }
    }
}

#[derive(Default)]
pub struct DispatcherBuilder {
    hooks: Vec<Arc<dyn InvocationHook>>,
    capabilities: Vec<Arc<dyn Capability>>,
}

impl DispatcherBuilder {
    pub fn hook(mut self, hook: Arc<dyn InvocationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Register a capability; a later registration with the same kind and name wins.
    pub fn capability(mut self, capability: Arc<dyn Capability>) -> Self {
        let (kind, name) = {
            let d = capability.descriptor();
            (d.kind, d.name.clone())
        };
        self.capabilities
            .retain(|c| !(c.descriptor().kind == kind && c.descriptor().name == name));
        self.capabilities.push(capability);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            hooks: self.hooks,
            capabilities: self.capabilities,
        }
    }
}

pub struct Dispatcher {
    hooks: Vec<Arc<dyn InvocationHook>>,
    capabilities: Vec<Arc<dyn Capability>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .capabilities
            .iter()
            .map(|c| c.descriptor().name.as_str())
            .collect();
        f.debug_struct("Dispatcher")
            .field("hooks", &self.hooks.len())
            .field("capabilities", &names)
            .finish()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn descriptors(&self, kind: CapabilityKind) -> Vec<&CapabilityDescriptor> {
        self.capabilities
            .iter()
            .map(|c| c.descriptor())
            .filter(|d| d.kind == kind)
            .collect()
    }

    fn find(&self, kind: CapabilityKind, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities
            .iter()
            .find(|c| c.descriptor().kind == kind && c.descriptor().name == name)
    }

    /// Run the hook chain and the target capability. Unknown targets fail before any
    /// hook runs.
    pub async fn dispatch(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        let capability = self
            .find(invocation.kind, &invocation.target)
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "{} '{}'",
                    invocation.kind.as_str(),
                    invocation.target
                ))
            })?;

        Next {
            hooks: &self.hooks,
            capability: capability.as_ref(),
        }
        .run(invocation, ctx)
        .await
    }
}
