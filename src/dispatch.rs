//! Function-call dispatch for completed responses.
//!
//! When a response completes with function-call items, every call is resolved
//! against the session's [`ToolRegistry`] and invoked. Calls of one completion
//! run concurrently; the resulting `function_call_output` items keep the order
//! of the calls that produced them.
//!
//! Each call fails on its own. An unknown tool name, arguments that do not
//! decode, or a handler error are logged and that call contributes no output.
//! Its siblings are unaffected.

use crate::tools::ToolRegistry;
use crate::types::{ConversationItem, FunctionCall, Response};
use futures::future::join_all;
use serde_json::Value;

/// Run every function call of `response` and collect the outputs.
///
/// An empty result means no follow-up request is needed.
pub async fn dispatch_function_calls(
    registry: &ToolRegistry,
    response: &Response,
) -> Vec<ConversationItem> {
    let calls = response
        .function_calls()
        .map(|call| run_call(registry, call));

    join_all(calls).await.into_iter().flatten().collect()
}

async fn run_call(registry: &ToolRegistry, call: &FunctionCall) -> Option<ConversationItem> {
    let Some(tool) = registry.get(&call.name) else {
        tracing::warn!(tool = %call.name, call_id = %call.call_id, "model called an unknown tool");
        return None;
    };

    let arguments = match tool.decode_arguments(&call.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            tracing::warn!(tool = %call.name, call_id = %call.call_id, error = %e, "could not decode tool arguments");
            return None;
        }
    };

    match tool.execute(arguments).await {
        Ok(result) => Some(ConversationItem::function_call_output(
            call.call_id.clone(),
            output_text(result),
        )),
        Err(e) => {
            tracing::warn!(tool = %call.name, call_id = %call.call_id, error = %e, "tool call failed");
            None
        }
    }
}

/// Strings are sent as-is, anything else as its JSON text.
fn output_text(result: Value) -> String {
    match result {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool;
    use crate::types::ConversationItem;
    use crate::Error;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn call(call_id: &str, name: &str, arguments: &str) -> ConversationItem {
        ConversationItem::FunctionCall(FunctionCall {
            id: format!("fc_{}", call_id),
            call_id: call_id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
            status: None,
        })
    }

    fn response_with(calls: Vec<ConversationItem>) -> Response {
        let mut response = Response::new("resp_1");
        response.output = calls;
        response
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(
                tool("slow_echo", "Echo after a delay")
                    .param("text", "string")
                    .build(|args| async move {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(args["text"].clone())
                    }),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                tool("fast_sum", "Add numbers")
                    .param("a", "number")
                    .param("b", "number")
                    .build(|args| async move {
                        let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
                        Ok(json!({"sum": sum}))
                    }),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                tool("broken", "Always fails").build(|_| async { Err(Error::tool("oven on fire")) }),
            ))
            .unwrap();
        registry
    }

    fn outputs(items: &[ConversationItem]) -> Vec<(&str, &str)> {
        items
            .iter()
            .map(|item| match item {
                ConversationItem::FunctionCallOutput(o) => (o.call_id.as_str(), o.output.as_str()),
                other => panic!("unexpected item {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_tool_produces_no_output() {
        let response = response_with(vec![call("c1", "preheat_oven", "{}")]);
        let items = dispatch_function_calls(&registry(), &response).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_outputs_keep_call_order() {
        let response = response_with(vec![
            call("c1", "slow_echo", r#"{"text":"knead"}"#),
            call("c2", "fast_sum", r#"{"a":1,"b":2}"#),
        ]);
        let items = dispatch_function_calls(&registry(), &response).await;

        assert_eq!(
            outputs(&items),
            vec![("c1", "knead"), ("c2", r#"{"sum":3.0}"#)]
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let response = response_with(vec![
            call("c1", "broken", "{}"),
            call("c2", "fast_sum", r#"{"a":"#),
            call("c3", "fast_sum", r#"{"a":1}"#),
            call("c4", "nope", "{}"),
            call("c5", "slow_echo", r#"{"text":"proof"}"#),
        ]);
        let items = dispatch_function_calls(&registry(), &response).await;

        assert_eq!(outputs(&items), vec![("c5", "proof")]);
    }

    #[tokio::test]
    async fn test_response_without_calls() {
        let mut response = Response::new("resp_1");
        response.output.push(ConversationItem::user_text("not a call"));
        assert!(dispatch_function_calls(&registry(), &response).await.is_empty());
    }
}
