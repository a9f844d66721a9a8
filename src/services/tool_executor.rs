use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ToolError;
use crate::services::envelope::Envelope;
use crate::services::logger::Logger;
use crate::services::session::ConversationContext;
use crate::utils::tool_errors::unknown_tool_error;

use serde_json::Value;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs `tool` for the conversation in `ctx`. Domain outcomes, failed ones
    /// included, come back as an [`Envelope`]; `Err` is reserved for calls that
    /// never reached the domain (bad arguments).
    async fn handle(
        &self,
        tool: &str,
        ctx: &ConversationContext,
        args: Value,
    ) -> Result<Envelope, ToolError>;
}

/// Deserializes tool arguments into the handler's typed form.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|err| ToolError::invalid_params(format!("{}: {}", tool, err)))
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn has_handler(&self, tool: &str) -> bool {
        self.handlers.contains_key(tool)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn execute(
        &self,
        tool: &str,
        ctx: &ConversationContext,
        args: Value,
    ) -> Result<Value, ToolError> {
        let Some(handler) = self.handlers.get(tool) else {
            return Err(unknown_tool_error(tool, &self.tool_names()));
        };

        let started_at = chrono::Utc::now().timestamp_millis();
        let call_id = uuid::Uuid::new_v4().to_string();
        self.logger.debug(
            "Tool call started",
            Some(&serde_json::json!({
                "tool": tool,
                "call_id": call_id,
                "conversation": ctx.id(),
                "args": args,
            })),
        );

        let envelope = handler.handle(tool, ctx, args).await?;

        let meta = serde_json::json!({
            "tool": tool,
            "call_id": call_id,
            "conversation": ctx.id(),
            "success": envelope.success,
            "duration_ms": chrono::Utc::now().timestamp_millis() - started_at,
        });
        if envelope.success {
            self.logger.info("Tool call finished", Some(&meta));
        } else {
            self.logger.warn("Tool call reported failure", Some(&meta));
        }
        Ok(envelope.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::SessionStore;
    use serde::Deserialize;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn handle(
            &self,
            tool: &str,
            ctx: &ConversationContext,
            args: Value,
        ) -> Result<Envelope, ToolError> {
            Ok(Envelope::success()
                .with("tool", tool)
                .with("conversation", ctx.id())
                .with("args", args))
        }
    }

    fn executor() -> ToolExecutor {
        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert("get_patient".to_string(), Arc::new(Echo));
        ToolExecutor::new(Logger::new("test"), handlers)
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let store = SessionStore::new();
        let ctx = store.context(Some("conv-1"), HashMap::new());
        let value = executor()
            .execute("get_patient", &ctx, serde_json::json!({"first_name": "Jane"}))
            .await
            .expect("dispatch");
        assert_eq!(value["success"], true);
        assert_eq!(value["tool"], "get_patient");
        assert_eq!(value["conversation"], "conv-1");
        assert_eq!(value["args"]["first_name"], "Jane");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found_with_suggestion() {
        let store = SessionStore::new();
        let ctx = store.context(None, HashMap::new());
        let err = executor()
            .execute("get_patients", &ctx, Value::Null)
            .await
            .expect_err("unknown tool");
        assert_eq!(err.code, "NOT_FOUND");
        assert_eq!(err.hint.as_deref(), Some("Did you mean: get_patient?"));
    }

    #[derive(Debug, Deserialize)]
    struct Args {
        person_id: String,
    }

    #[test]
    fn parse_args_reports_missing_fields_as_invalid_params() {
        let err = parse_args::<Args>("get_patient_appointments", serde_json::json!({}))
            .expect_err("missing person_id");
        assert_eq!(err.code, "INVALID_PARAMS");
        assert!(err.message.contains("person_id"), "{}", err.message);

        let ok: Args = parse_args("x", serde_json::json!({"person_id": "p-1"})).expect("args");
        assert_eq!(ok.person_id, "p-1");
    }
}
