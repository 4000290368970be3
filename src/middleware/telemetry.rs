//! Start/success/failure signals for every capability invocation.
//!
//! Arguments are never recorded; they may carry user data.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Instrument, field, info, info_span, warn};

use crate::dispatch::{CapabilityKind, InvocationHook, Invocation, Next, RequestContext};
use crate::error::AppError;

#[derive(Debug, Default)]
pub struct TelemetryHook;

impl TelemetryHook {
    pub fn new() -> Self {
        Self
    }
}

fn span_name(invocation: &Invocation) -> String {
    match invocation.kind {
        CapabilityKind::Tool => format!("tool.{}", invocation.target),
        CapabilityKind::Resource => format!("resource.{}", invocation.target),
    }
}

#[async_trait]
impl InvocationHook for TelemetryHook {
    async fn around(
        &self,
        invocation: &Invocation,
        ctx: &RequestContext,
        next: Next<'_>,
    ) -> Result<Value, AppError> {
        let span = info_span!(
            "mcp.invocation",
            otel.name = %span_name(invocation),
            mcp.method = invocation.kind.method(),
            mcp.kind = invocation.kind.as_str(),
            mcp.target = %invocation.target,
            request_id = %ctx.request_id(),
            identity.stage = field::Empty,
        );

        async move {
            let started = Instant::now();
            info!("started");

            let result = next.run(invocation, ctx).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(_) => info!(elapsed_ms, "succeeded"),
                Err(err) => warn!(elapsed_ms, code = err.code(), error = %err, "failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn span_names_follow_kind_and_target() {
        assert_eq!(
            span_name(&Invocation::tool("add_user_expense", json!({}))),
            "tool.add_user_expense"
        );
        assert_eq!(
            span_name(&Invocation::resource("expenses://me")),
            "resource.expenses://me"
        );
    }
}
