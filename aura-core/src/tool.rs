//! Tool/function invocation types.
//!
//! The remote model can ask the client to perform a named side effect
//! mid-session and expects the result back, keyed by correlation ID, before
//! it continues generating. The executing callback is injected by the host
//! application; this module only fixes the shapes and the seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool/function definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, parameters: None }
    }

    /// Set the tool description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }
}

/// A tool call received from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation ID the response must carry.
    pub correlation_id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as JSON.
    pub arguments: Value,
}

/// The result sent back for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Correlation ID of the invocation being answered.
    pub correlation_id: String,
    /// Plain-text result handed back to the model.
    pub result: String,
}

impl ToolOutcome {
    /// Answer an invocation with a result string.
    pub fn for_invocation(invocation: &ToolInvocation, result: impl Into<String>) -> Self {
        Self { correlation_id: invocation.correlation_id.clone(), result: result.into() }
    }
}

/// Host-injected tool executor.
///
/// Implementations must be fast: the session holds further generation for
/// the turn until the outcome is sent back.
#[async_trait]
pub trait ToolBroker: Send + Sync {
    /// Execute a tool call and return its plain-text result. Unknown tools
    /// should return a descriptive string rather than panic — the model
    /// handles the refusal.
    async fn execute(&self, invocation: &ToolInvocation) -> String;
}

/// Function-based broker for simple hosts and tests.
pub struct FnToolBroker<F>
where
    F: Fn(&ToolInvocation) -> String + Send + Sync,
{
    handler: F,
}

impl<F> FnToolBroker<F>
where
    F: Fn(&ToolInvocation) -> String + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> ToolBroker for FnToolBroker<F>
where
    F: Fn(&ToolInvocation) -> String + Send + Sync,
{
    async fn execute(&self, invocation: &ToolInvocation) -> String {
        (self.handler)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_broker_dispatch() {
        let broker = FnToolBroker::new(|inv: &ToolInvocation| format!("ran {}", inv.name));
        let inv = ToolInvocation {
            correlation_id: "c1".into(),
            name: "open_app".into(),
            arguments: serde_json::json!({"app_name": "maps"}),
        };
        assert_eq!(broker.execute(&inv).await, "ran open_app");
    }

    #[test]
    fn test_outcome_copies_correlation_id() {
        let inv = ToolInvocation {
            correlation_id: "c9".into(),
            name: "t".into(),
            arguments: serde_json::Value::Null,
        };
        let outcome = ToolOutcome::for_invocation(&inv, "done");
        assert_eq!(outcome.correlation_id, "c9");
        assert_eq!(outcome.result, "done");
    }
}
