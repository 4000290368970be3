use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::context::RequestContext;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Resource => "resource",
        }
    }

    /// JSON-RPC method that invokes this kind.
    pub fn method(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tools/call",
            CapabilityKind::Resource => "resources/read",
        }
    }
}

/// Static description of a capability, used for listing and by the hooks.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub kind: CapabilityKind,
    /// Tool name, or resource URI.
    pub name: String,
    pub description: String,
    pub requires_identity: bool,
    /// Gated on admin group membership.
    pub privileged: bool,
    pub input_schema: Option<Value>,
    pub mime_type: Option<String>,
}

impl CapabilityDescriptor {
    pub fn tool(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            kind: CapabilityKind::Tool,
            name: name.into(),
            description: description.into(),
            requires_identity: false,
            privileged: false,
            input_schema: Some(schema),
            mime_type: None,
        }
    }

    pub fn resource(
        uri: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            kind: CapabilityKind::Resource,
            name: uri.into(),
            description: description.into(),
            requires_identity: false,
            privileged: false,
            input_schema: None,
            mime_type: Some(mime_type.into()),
        }
    }

    pub fn requiring_identity(mut self) -> Self {
        self.requires_identity = true;
        self
    }

    /// Privileged capabilities always require identity too.
    pub fn privileged(mut self) -> Self {
        self.requires_identity = true;
        self.privileged = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub kind: CapabilityKind,
    pub target: String,
    pub arguments: Value,
}

impl Invocation {
    pub fn tool(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            kind: CapabilityKind::Tool,
            target: name.into(),
            arguments,
        }
    }

    pub fn resource(uri: impl Into<String>) -> Self {
        Self {
            kind: CapabilityKind::Resource,
            target: uri.into(),
            arguments: Value::Null,
        }
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    async fn invoke(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
    ) -> Result<Value, AppError>;
}
