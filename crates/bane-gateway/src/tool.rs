// tool.rs — Guard for tool invocations.
//
// A tool call is evaluated like any other request, routed as `tool:<name>`
// with the tool's capability required. The tool body runs only when the
// decision is allow or sanitize.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bane_policy::{AuthContext, BaneEngine, EvaluationInput, EvaluationOutput, GENERIC_DENIAL};

/// One tool invocation by an authenticated caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_name: String,
    pub required_capability: String,
    /// Tool arguments as text; this is what the detectors see.
    #[serde(default)]
    pub args_text: String,
    #[serde(default)]
    pub auth: Option<AuthContext>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, required_capability: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            required_capability: required_capability.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args_text: impl Into<String>) -> Self {
        self.args_text = args_text.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    /// `tool:<name>`, the route the engine sees.
    pub fn route(&self) -> String {
        format!("tool:{}", self.tool_name)
    }

    fn to_input(&self) -> EvaluationInput {
        let input = EvaluationInput::new(self.args_text.clone(), self.route())
            .with_capability(self.required_capability.clone());
        match &self.auth {
            Some(auth) => input.with_auth(auth.clone()),
            None => input,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ToolDecision {
    #[serde(rename_all = "camelCase")]
    Allow { trace_id: String },
    #[serde(rename_all = "camelCase")]
    Deny { trace_id: String, message: String },
}

impl ToolDecision {
    /// Deny and review both refuse the call.
    pub fn from_output(output: &EvaluationOutput) -> Self {
        if output.is_denied() || output.verdict == bane_policy::Verdict::Review {
            ToolDecision::Deny {
                trace_id: output.trace_id.clone(),
                message: output
                    .public_message
                    .clone()
                    .unwrap_or_else(|| GENERIC_DENIAL.to_string()),
            }
        } else {
            ToolDecision::Allow {
                trace_id: output.trace_id.clone(),
            }
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, ToolDecision::Allow { .. })
    }

    pub fn trace_id(&self) -> &str {
        match self {
            ToolDecision::Allow { trace_id } | ToolDecision::Deny { trace_id, .. } => trace_id,
        }
    }
}

/// Outcome of `run_guarded_tool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome<T> {
    Completed { trace_id: String, value: T },
    Denied { trace_id: String, message: String },
}

impl<T> ToolOutcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            ToolOutcome::Completed { value, .. } => Some(value),
            ToolOutcome::Denied { .. } => None,
        }
    }
}

/// Gates tool invocations through the engine.
pub struct ToolGuard {
    engine: Arc<BaneEngine>,
}

impl ToolGuard {
    pub fn new(engine: Arc<BaneEngine>) -> Self {
        Self { engine }
    }

    /// Evaluate `call` without running anything.
    pub fn check(&self, call: &ToolCall) -> ToolDecision {
        let output = self.engine.evaluate(&call.to_input());
        let decision = ToolDecision::from_output(&output);
        if !decision.is_allowed() {
            tracing::debug!(
                tool = %call.tool_name,
                trace_id = %output.trace_id,
                level = output.enforcement_level,
                "tool call refused"
            );
        }
        decision
    }
}

/// Evaluate `call` and run `tool` only if it is allowed.
pub fn run_guarded_tool<T, F>(guard: &ToolGuard, call: &ToolCall, tool: F) -> ToolOutcome<T>
where
    F: FnOnce() -> T,
{
    match guard.check(call) {
        ToolDecision::Allow { trace_id } => ToolOutcome::Completed {
            trace_id,
            value: tool(),
        },
        ToolDecision::Deny { trace_id, message } => ToolOutcome::Denied { trace_id, message },
    }
}
